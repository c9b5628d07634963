//! Synthetic document generator.
//!
//! Builds a fully signed SOD plus matching data groups with throwaway keys,
//! for tests and for the CLI `mock` subcommand. The chain mirrors a real
//! issuance: a self-signed CSCA root signs a document signer certificate,
//! and the document signer key signs the SOD's attributes.

use std::str::FromStr;
use std::time::Duration;

use cms::{
    cert::{CertificateChoices, IssuerAndSerialNumber},
    content_info::{CmsVersion, ContentInfo},
    signed_data::{
        CertificateSet, DigestAlgorithmIdentifiers, EncapsulatedContentInfo, SignedAttributes,
        SignedData, SignerIdentifier, SignerInfo, SignerInfos,
    },
};
use color_eyre::Result;
use const_oid::db::rfc5912::{ECDSA_WITH_SHA_256, ID_SHA_256, SECP_256_R_1};
use der::{
    asn1::{BitString, OctetString, OctetStringRef, SetOfVec},
    Any, Decode, Encode, Sequence, Tag, ValueOrd,
};
use digest::const_oid::ObjectIdentifier;
use p256::ecdsa::{signature::Signer, DerSignature, SigningKey};
use x509_cert::{
    attr::Attribute,
    builder::{Builder, CertificateBuilder, Profile},
    certificate::CertificateInner,
    name::Name,
    serial_number::SerialNumber,
    spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned},
    time::Validity,
};

use crate::{
    digest::Sha2,
    scan::{DataGroups, DocumentScan},
    sod::OID_ICAO_LDS_SECURITY_OBJECT,
    tlv::push_length,
};

const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const OID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
const OID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

const OID_ID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

#[derive(Clone, Debug)]
pub struct MockConfig {
    /// MRZ expiry, YYMMDD.
    pub expiry: String,
    /// Wrap the ContentInfo in the ICAO application-23 envelope.
    pub wrapped: bool,
    /// Flip a byte of the encapsulated content after the attributes were
    /// built, so the messageDigest check fails.
    pub corrupt_econtent: bool,
    /// Flip a byte of the CMS signature.
    pub corrupt_signature: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            expiry: "301231".to_string(),
            wrapped: true,
            corrupt_econtent: false,
            corrupt_signature: false,
        }
    }
}

pub struct MockDocument {
    pub sod: Vec<u8>,
    pub data_groups: DataGroups,
    pub csca_der: Vec<u8>,
}

impl MockDocument {
    pub fn to_scan(&self) -> DocumentScan {
        DocumentScan {
            sod: self.sod.clone(),
            data_groups: self
                .data_groups
                .numbers()
                .map(|n| {
                    (
                        format!("dg{n}"),
                        self.data_groups.get(n).expect("infallible").to_vec(),
                    )
                })
                .collect(),
        }
    }
}

fn mock_dg1(expiry: &str) -> Vec<u8> {
    assert_eq!(expiry.len(), 6, "MRZ expiry must be YYMMDD");
    let zone = format!(
        "I<VNM123456789<<<<<<<<<<<<<<<<9001013M{expiry}9VNM<<<<<<<<<<<4NGUYEN<<VAN<AN<<<<<<<<<<<<<<<<"
    );
    let mut inner = vec![0x5f, 0x1f];
    push_length(&mut inner, zone.len());
    inner.extend_from_slice(zone.as_bytes());
    let mut out = vec![0x61];
    push_length(&mut out, inner.len());
    out.extend_from_slice(&inner);
    out
}

fn mock_dg2() -> Vec<u8> {
    // Biometric template header bytes, then a JPEG stub.
    let mut out = vec![0x75, 0x1a, 0x7f, 0x61, 0x12, 0x02, 0x01, 0x01];
    out.extend_from_slice(&[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46, 0x49, 0x46]);
    out
}

fn utf8_tlv(text: &str) -> Vec<u8> {
    let mut out = vec![0x0c];
    push_length(&mut out, text.len());
    out.extend_from_slice(text.as_bytes());
    out
}

fn sequence_tlv(body: &[u8]) -> Vec<u8> {
    let mut out = vec![0x30];
    push_length(&mut out, body.len());
    out.extend_from_slice(body);
    out
}

fn mock_dg13() -> Vec<u8> {
    let entry = |id: u8, value: &[u8]| sequence_tlv(&[&[0x02, 0x01, id][..], value].concat());
    let mut entries = Vec::new();
    entries.extend(entry(1, &utf8_tlv("Nguyễn Văn An")));
    entries.extend(entry(2, &utf8_tlv("087123456789")));
    entries.extend(entry(4, &utf8_tlv("Hà Nội")));
    entries.extend(entry(5, &utf8_tlv("Quận Ba Đình, Hà Nội")));
    let parents = sequence_tlv(
        &[utf8_tlv("Nguyễn Văn Bình"), utf8_tlv("Trần Thị Cúc")].concat(),
    );
    entries.extend(entry(13, &parents));
    sequence_tlv(&entries)
}

#[derive(Sequence)]
struct LdsSecurityObject {
    version: i32,
    digest_algorithm: AlgorithmIdentifierOwned,
    dg_digests: Vec<DataGroupHash>,
}

#[derive(Sequence, ValueOrd)]
struct DataGroupHash {
    number: u8,
    value: OctetString,
}

fn mock_lds(groups: &[(u8, &[u8])]) -> Result<Vec<u8>> {
    let dg_digests = groups
        .iter()
        .map(|(number, content)| {
            Ok(DataGroupHash {
                number: *number,
                value: OctetString::new(Sha2::Sha256.digest(content).to_vec())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let lds = LdsSecurityObject {
        version: 0,
        digest_algorithm: AlgorithmIdentifierOwned {
            oid: ID_SHA_256,
            parameters: None,
        },
        dg_digests,
    };
    Ok(lds.to_der()?)
}

fn prepare_signed_attributes(lds_hash: &[u8]) -> Result<Vec<u8>> {
    let content_type_attr = Attribute {
        oid: OID_CONTENT_TYPE,
        values: SetOfVec::try_from(vec![OID_ICAO_LDS_SECURITY_OBJECT.into()])
            .expect("infallible"),
    };
    let message_digest_attr = Attribute {
        oid: OID_MESSAGE_DIGEST,
        values: SetOfVec::try_from(vec![OctetStringRef::new(lds_hash)
            .expect("infallible")
            .into()])
        .expect("infallible"),
    };
    let signed_attrs = SignedAttributes::from(
        SetOfVec::try_from(vec![content_type_attr, message_digest_attr]).expect("infallible"),
    );
    Ok(signed_attrs.to_der()?)
}

fn spki_for(secret: &SigningKey) -> Result<SubjectPublicKeyInfoOwned> {
    Ok(SubjectPublicKeyInfoOwned {
        algorithm: AlgorithmIdentifierOwned {
            oid: OID_ID_EC_PUBLIC_KEY,
            parameters: Some(Any::from_der(&SECP_256_R_1.to_der()?)?),
        },
        subject_public_key: BitString::from_bytes(
            secret.verifying_key().to_encoded_point(false).as_bytes(),
        )?,
    })
}

fn build_root(secret: &SigningKey, name: &Name, serial: u8) -> Result<CertificateInner> {
    let builder = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::new(&[serial])?,
        Validity::from_now(Duration::from_secs(10 * 365 * 24 * 60 * 60))?,
        name.clone(),
        spki_for(secret)?,
        secret,
    )?;
    Ok(builder.build::<DerSignature>()?)
}

pub fn mock_document(config: &MockConfig) -> Result<MockDocument> {
    let dg1 = mock_dg1(&config.expiry);
    let dg2 = mock_dg2();
    let dg13 = mock_dg13();

    let lds_der = mock_lds(&[(1, &dg1), (2, &dg2), (13, &dg13)])?;
    let signed_attrs_der = prepare_signed_attributes(&Sha2::Sha256.digest(&lds_der))?;

    let csca_secret = SigningKey::from_slice(&[0x11; 32])?;
    let ds_secret = SigningKey::from_slice(&[0x22; 32])?;

    let csca_name = Name::from_str("CN=Test CSCA,C=VN")?;
    let ds_name = Name::from_str("CN=Test Document Signer,C=VN")?;

    let csca_cert = build_root(&csca_secret, &csca_name, 1)?;
    let ds_builder = CertificateBuilder::new(
        Profile::Leaf {
            issuer: csca_name.clone(),
            enable_key_agreement: false,
            enable_key_encipherment: false,
        },
        SerialNumber::new(&[2])?,
        Validity::from_now(Duration::from_secs(365 * 24 * 60 * 60))?,
        ds_name,
        spki_for(&ds_secret)?,
        &csca_secret,
    )?;
    let ds_cert: CertificateInner = ds_builder.build::<DerSignature>()?;

    let signature: DerSignature = ds_secret.sign(&signed_attrs_der);
    let mut signature_der = signature.to_der()?;
    if config.corrupt_signature {
        *signature_der.last_mut().expect("infallible") ^= 0x01;
    }

    let mut econtent = lds_der;
    if config.corrupt_econtent {
        // Last byte belongs to the final digest value, so the DER stays
        // well-formed while the content hash changes.
        *econtent.last_mut().expect("infallible") ^= 0xff;
    }

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: ds_cert.tbs_certificate.issuer.clone(),
            serial_number: ds_cert.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: AlgorithmIdentifierOwned {
            oid: ID_SHA_256,
            parameters: None,
        },
        signed_attrs: Some(SignedAttributes::from_der(&signed_attrs_der)?),
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA_256,
            parameters: None,
        },
        signature: OctetString::new(signature_der)?,
        unsigned_attrs: None,
    };

    let signed_data = SignedData {
        version: CmsVersion::V3,
        digest_algorithms: DigestAlgorithmIdentifiers::try_from(vec![AlgorithmIdentifierOwned {
            oid: ID_SHA_256,
            parameters: None,
        }])?,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: OID_ICAO_LDS_SECURITY_OBJECT,
            econtent: Some(Any::new(Tag::OctetString, econtent)?),
        },
        certificates: Some(CertificateSet(SetOfVec::try_from(vec![
            CertificateChoices::Certificate(ds_cert),
        ])?)),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
    };

    let content_info = ContentInfo {
        content_type: OID_SIGNED_DATA,
        content: Any::encode_from(&signed_data)?,
    };
    let content_der = content_info.to_der()?;

    let sod = if config.wrapped {
        let mut out = vec![0x77];
        push_length(&mut out, content_der.len());
        out.extend_from_slice(&content_der);
        out
    } else {
        content_der
    };

    let data_groups = DataGroups::from_iter([(1u8, dg1), (2u8, dg2), (13u8, dg13)]);

    Ok(MockDocument {
        sod,
        data_groups,
        csca_der: csca_cert.to_der()?,
    })
}

/// A root certificate with no relation to the mock document's chain, for
/// exercising the "attempted and failed" trust-anchor outcome.
pub fn unrelated_csca() -> Result<Vec<u8>> {
    let secret = SigningKey::from_slice(&[0x33; 32])?;
    let name = Name::from_str("CN=Unrelated CSCA,C=DE")?;
    Ok(build_root(&secret, &name, 9)?.to_der()?)
}
