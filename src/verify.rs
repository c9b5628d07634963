//! Passive authentication orchestrator.
//!
//! One call wires the whole pipeline together: SOD extraction, signature
//! verification, optional trust-anchor validation, and per-DG digest checks,
//! producing a single [`VerificationReport`]. Each call is a pure function
//! of its inputs; nothing is cached or retained between calls.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_with::{base64::Base64, hex::Hex, serde_as};
use tracing::{debug, warn};

use crate::{
    cert::{validate_chain, CertificateRecord},
    digest::Sha2,
    error::VerifyError,
    fields::{self, FieldValue},
    profile::DocumentProfile,
    scan::DataGroups,
    signature,
    sod::Sod,
};

/// Field id resolved for the expiry policy check.
const EXPIRY_FIELD: &str = "dateOfExpiry";

#[serde_as]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestCheck {
    pub dg_number: u8,
    #[serde_as(as = "Hex")]
    pub expected_hash: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub calculated_hash: Vec<u8>,
    pub is_valid: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassiveAuthDetails {
    pub signature_valid: bool,
    pub dg_hashes_matched: bool,
    pub dg_hashes: Vec<DigestCheck>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassiveAuthentication {
    pub success: bool,
    pub details: PassiveAuthDetails,
}

/// Trust-anchor outcome. "Not attempted" (no CSCA supplied) is deliberately
/// distinct from "attempted and failed".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChainStatus {
    NotAttempted,
    Valid,
    Invalid,
}

impl ChainStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainStatus::Valid)
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerCertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateVerification {
    pub chain_status: ChainStatus,
    /// Boolean view of `chain_status` for flat consumers.
    pub csca_linked: bool,
    pub signer_certificate: SignerCertificateInfo,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStatus {
    pub expired: bool,
    pub expiry_date: Option<NaiveDate>,
}

#[serde_as]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub passive_authentication: PassiveAuthentication,
    pub certificate_verification: CertificateVerification,
    /// Data groups the security object lists but the caller did not supply.
    /// They are excluded from the digest checks and surfaced here instead.
    pub missing_data_groups: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_status: Option<DocumentStatus>,
    #[serde_as(as = "Base64")]
    pub ds_certificate: Vec<u8>,
}

/// Run passive authentication: prove the supplied data groups are the ones
/// the issuer signed.
///
/// `passiveAuthSuccess` is the conjunction of the CMS signature check and
/// every performed digest check. Trust-anchor validation is reported
/// separately and never gates it: the chain ties the signer to a country
/// root, it is not part of the integrity proof itself.
pub fn verify_document(
    sod_bytes: &[u8],
    dgs: &DataGroups,
    csca_der: Option<&[u8]>,
) -> Result<VerificationReport, VerifyError> {
    let sod = Sod::parse(sod_bytes)?;
    let dsc = CertificateRecord::from_certificate(sod.certificate()?)?;
    let security_object = sod.security_object()?;

    let signature_valid = signature::verify_sod(&sod)?;
    debug!(signature_valid, "SOD signature checked");

    let chain_status = match csca_der {
        None => ChainStatus::NotAttempted,
        Some(bytes) => {
            let csca = CertificateRecord::from_der(bytes)?;
            match validate_chain(&dsc, &csca) {
                Ok(true) => ChainStatus::Valid,
                Ok(false) => ChainStatus::Invalid,
                Err(error) => {
                    warn!(%error, "trust-anchor validation could not complete");
                    ChainStatus::Invalid
                }
            }
        }
    };

    let hash = Sha2::from_digest_algo_oid(&security_object.hash_algorithm)?;
    let mut dg_hashes = Vec::new();
    let mut missing_data_groups = Vec::new();
    for entry in &security_object.entries {
        match dgs.get(entry.dg_number) {
            Some(raw) => {
                let calculated = hash.digest(raw).to_vec();
                let is_valid = calculated == entry.expected;
                dg_hashes.push(DigestCheck {
                    dg_number: entry.dg_number,
                    expected_hash: entry.expected.clone(),
                    calculated_hash: calculated,
                    is_valid,
                });
            }
            None => missing_data_groups.push(entry.dg_number),
        }
    }
    if !missing_data_groups.is_empty() {
        warn!(
            ?missing_data_groups,
            "security object lists data groups that were not supplied"
        );
    }

    let dg_hashes_matched = dg_hashes.iter().all(|check| check.is_valid);
    let success = signature_valid && dg_hashes_matched;

    Ok(VerificationReport {
        passive_authentication: PassiveAuthentication {
            success,
            details: PassiveAuthDetails {
                signature_valid,
                dg_hashes_matched,
                dg_hashes,
            },
        },
        certificate_verification: CertificateVerification {
            chain_status,
            csca_linked: chain_status.is_valid(),
            signer_certificate: SignerCertificateInfo {
                subject: dsc.subject.clone(),
                issuer: dsc.issuer.clone(),
                valid_from: dsc.not_before,
                valid_to: dsc.not_after,
            },
        },
        missing_data_groups,
        document_status: None,
        ds_certificate: dsc.der,
    })
}

/// [`verify_document`] plus the expiry policy check: resolves the profile's
/// expiry field and flags a document whose expiry date is before `today`.
/// Expiry never affects the cryptographic outcome; the two axes are
/// reported independently.
pub fn verify_with_expiry(
    sod_bytes: &[u8],
    dgs: &DataGroups,
    csca_der: Option<&[u8]>,
    profile: &DocumentProfile,
    today: NaiveDate,
) -> Result<VerificationReport, VerifyError> {
    let mut report = verify_document(sod_bytes, dgs, csca_der)?;
    let expiry_date = match fields::resolve_field(profile, EXPIRY_FIELD, dgs) {
        Some(FieldValue::Date(date)) => Some(date),
        _ => None,
    };
    report.document_status = Some(DocumentStatus {
        expired: expiry_date.is_some_and(|date| date < today),
        expiry_date,
    });
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{mock_document, MockConfig};
    use crate::signature::test_instrumentation;

    #[test]
    fn digest_mismatch_short_circuits_before_asymmetric_verification() {
        let doc = mock_document(&MockConfig {
            corrupt_econtent: true,
            ..MockConfig::default()
        })
        .unwrap();

        let before = test_instrumentation::asymmetric_ops();
        let report = verify_document(&doc.sod, &doc.data_groups, None).unwrap();
        assert!(!report.passive_authentication.details.signature_valid);
        assert!(!report.passive_authentication.success);
        // The counter is thread-local; verification runs on this thread.
        assert_eq!(test_instrumentation::asymmetric_ops(), before);
    }

    #[test]
    fn valid_document_does_reach_asymmetric_verification() {
        let doc = mock_document(&MockConfig::default()).unwrap();
        let before = test_instrumentation::asymmetric_ops();
        let report = verify_document(&doc.sod, &doc.data_groups, None).unwrap();
        assert!(report.passive_authentication.success);
        assert!(test_instrumentation::asymmetric_ops() > before);
    }
}
