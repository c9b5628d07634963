use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use mrtd_verify::{
    fields, mock,
    profile::ProfileRegistry,
    scan::DocumentScan,
    verify::verify_with_expiry,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// runs passive authentication on a document scan json
    Verify {
        /// json file with "sod" and "dataGroups" as base64
        #[arg(required = true, value_name = "FILE")]
        scan_file: PathBuf,

        /// DER-encoded CSCA certificate to validate the signer against
        #[arg(long, value_name = "FILE")]
        csca: Option<PathBuf>,

        /// document profile used for the expiry check
        #[arg(long, default_value = "VN-CCCD-2024")]
        profile: String,
    },

    /// decodes identity fields from a document scan json
    Fields {
        #[arg(required = true, value_name = "FILE")]
        scan_file: PathBuf,

        #[arg(long, default_value = "VN-CCCD-2024")]
        profile: String,
    },

    /// generates a mock document scan for testing
    Mock {
        /// MRZ expiry date, YYMMDD
        #[arg(long, default_value = "301231")]
        expiry: String,

        /// write the matching CSCA certificate (DER) to this path
        #[arg(long, value_name = "FILE")]
        csca_out: Option<PathBuf>,
    },
}

fn read_scan(scan_file: &PathBuf) -> Result<DocumentScan> {
    let file = File::open(scan_file).wrap_err("opening document scan")?;
    serde_json::from_reader(BufReader::new(file)).wrap_err("parsing document scan json")
}

fn lookup_profile<'r>(
    registry: &'r ProfileRegistry,
    profile_id: &str,
) -> Result<&'r mrtd_verify::DocumentProfile> {
    registry
        .get(profile_id)
        .ok_or_else(|| eyre!("unknown document profile {profile_id}"))
}

fn handle_verify(scan_file: &PathBuf, csca: Option<&PathBuf>, profile_id: &str) -> Result<()> {
    let scan = read_scan(scan_file)?;
    let dgs = scan.data_groups()?;
    let csca_der = csca
        .map(|path| fs::read(path).wrap_err("reading CSCA certificate"))
        .transpose()?;

    let registry = ProfileRegistry::builtin();
    let profile = lookup_profile(&registry, profile_id)?;

    let report = verify_with_expiry(
        &scan.sod,
        &dgs,
        csca_der.as_deref(),
        profile,
        Utc::now().date_naive(),
    )?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_fields(scan_file: &PathBuf, profile_id: &str) -> Result<()> {
    let scan = read_scan(scan_file)?;
    let dgs = scan.data_groups()?;
    let registry = ProfileRegistry::builtin();
    let profile = lookup_profile(&registry, profile_id)?;

    let identity = fields::resolve_all(profile, &dgs);
    println!("{}", serde_json::to_string_pretty(&identity)?);
    Ok(())
}

fn handle_mock(expiry: String, csca_out: Option<&PathBuf>) -> Result<()> {
    let document = mock::mock_document(&mock::MockConfig {
        expiry,
        ..mock::MockConfig::default()
    })?;
    if let Some(path) = csca_out {
        fs::write(path, &document.csca_der).wrap_err("writing CSCA certificate")?;
    }
    println!("{}", serde_json::to_string_pretty(&document.to_scan())?);
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Verify {
            scan_file,
            csca,
            profile,
        } => handle_verify(scan_file, csca.as_ref(), profile),
        Commands::Fields { scan_file, profile } => handle_fields(scan_file, profile),
        Commands::Mock { expiry, csca_out } => handle_mock(expiry.clone(), csca_out.as_ref()),
    }
}
