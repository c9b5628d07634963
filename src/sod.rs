//! Security Object (EF.SOD) extraction.
//!
//! A SOD arrives either as a bare CMS `ContentInfo` SEQUENCE or wrapped in
//! the ICAO application tag 23 (`0x77`). The wrapper choice is resolved once
//! here; everything downstream works on the extracted `SignedData`.

use cms::{
    cert::{x509::certificate::CertificateInner, CertificateChoices},
    content_info::ContentInfo,
    signed_data::{SignedData, SignerInfo},
};
use const_oid::ObjectIdentifier;
use der::{
    asn1::{OctetString, OctetStringRef, PrintableString},
    Decode, Sequence,
};
use spki::AlgorithmIdentifierOwned;
use tracing::debug;

use crate::{
    error::ParseError,
    tlv::{TagClass, TlvNode},
};

/// id-icao-mrtd-security-ldsSecurityObject
pub const OID_ICAO_LDS_SECURITY_OBJECT: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.23.136.1.1.1");

const SOD_WRAPPER_TAG: u32 = 23;

/// Parsed SOD: the CMS `SignedData` plus the unwrapped encapsulated content
/// (the DER of the LDS security object, which is also the signed payload).
#[derive(Debug)]
pub struct Sod {
    signed_data: SignedData,
    econtent: Vec<u8>,
}

impl Sod {
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let first = *bytes.first().ok_or(ParseError::Malformed {
            offset: 0,
            reason: "empty security object",
        })?;

        let content_der: &[u8] = if first == 0x30 {
            bytes
        } else {
            let node = TlvNode::parse(bytes)?;
            if node.class != TagClass::Application
                || node.number != SOD_WRAPPER_TAG
                || !node.constructed
            {
                return Err(ParseError::UnsupportedWrapper { tag: first });
            }
            debug!("unwrapping application-23 SOD envelope");
            if node.value.first() != Some(&0x30) {
                return Err(ParseError::UnsupportedWrapper {
                    tag: node.value.first().copied().unwrap_or(0),
                });
            }
            node.value
        };

        let content_info = ContentInfo::from_der(content_der)?;
        let signed_data = content_info.content.decode_as::<SignedData>()?;

        let enc = &signed_data.encap_content_info;
        if enc.econtent_type != OID_ICAO_LDS_SECURITY_OBJECT {
            return Err(ParseError::Malformed {
                offset: 0,
                reason: "encapsulated content is not an LDS security object",
            });
        }
        let econtent = enc
            .econtent
            .as_ref()
            .ok_or(ParseError::MissingContent)?
            .decode_as::<OctetStringRef>()?
            .as_bytes()
            .to_vec();

        Ok(Self {
            signed_data,
            econtent,
        })
    }

    /// The signed payload: DER bytes of the LDS security object.
    pub fn econtent(&self) -> &[u8] {
        &self.econtent
    }

    pub fn signed_data(&self) -> &SignedData {
        &self.signed_data
    }

    /// The sole `SignerInfo`. Multi-signer SODs are rejected.
    pub fn signer_info(&self) -> Result<&SignerInfo, ParseError> {
        let infos = self.signed_data.signer_infos.0.as_ref();
        match infos.len() {
            1 => Ok(&infos[0]),
            count => Err(ParseError::SignerCount { count }),
        }
    }

    /// The document signer certificate embedded in the SOD.
    pub fn certificate(&self) -> Result<&CertificateInner, ParseError> {
        self.signed_data
            .certificates
            .as_ref()
            .and_then(|set| {
                set.0.as_ref().iter().find_map(|choice| match choice {
                    CertificateChoices::Certificate(cert) => Some(cert),
                    _ => None,
                })
            })
            .ok_or(ParseError::MissingCertificate)
    }

    pub fn security_object(&self) -> Result<SecurityObject, ParseError> {
        SecurityObject::from_der(&self.econtent)
    }
}

#[derive(Sequence, Debug)]
struct LdsSecurityObjectDer {
    version: i32,
    digest_algorithm: AlgorithmIdentifierOwned,
    dg_digests: Vec<DataGroupHashDer>,
    version_info: Option<LdsVersionInfo>,
}

#[derive(Sequence, Debug)]
struct DataGroupHashDer {
    number: u8,
    value: OctetString,
}

#[derive(Sequence, Debug)]
struct LdsVersionInfo {
    lds_version: PrintableString,
    unicode_version: PrintableString,
}

/// Hash algorithm plus the ordered per-DG hash list the issuer signed.
#[derive(Clone, Debug)]
pub struct SecurityObject {
    pub version: i32,
    pub hash_algorithm: ObjectIdentifier,
    pub entries: Vec<DataGroupHash>,
    /// LDS and Unicode versions from the optional LDSVersionInfo tail.
    pub lds_version: Option<(String, String)>,
}

#[derive(Clone, Debug)]
pub struct DataGroupHash {
    pub dg_number: u8,
    pub expected: Vec<u8>,
}

impl SecurityObject {
    fn from_der(bytes: &[u8]) -> Result<Self, ParseError> {
        let lds = LdsSecurityObjectDer::from_der(bytes)?;
        Ok(Self {
            version: lds.version,
            hash_algorithm: lds.digest_algorithm.oid,
            entries: lds
                .dg_digests
                .into_iter()
                .map(|dg| DataGroupHash {
                    dg_number: dg.number,
                    expected: dg.value.as_bytes().to_vec(),
                })
                .collect(),
            lds_version: lds
                .version_info
                .map(|info| (info.lds_version.to_string(), info.unicode_version.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use const_oid::db::rfc5912::ID_SHA_256;
    use der::Encode;

    #[test]
    fn rejects_unknown_wrapper_tag() {
        let err = Sod::parse(&[0x04, 0x02, 0xaa, 0xbb]).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedWrapper { tag: 0x04 }));
    }

    #[test]
    fn rejects_wrapper_without_inner_sequence() {
        // Application-23 envelope around an OCTET STRING.
        let err = Sod::parse(&[0x77, 0x04, 0x04, 0x02, 0xaa, 0xbb]).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedWrapper { tag: 0x04 }));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(
            Sod::parse(&[]),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn decodes_security_object() {
        let lds = LdsSecurityObjectDer {
            version: 0,
            digest_algorithm: AlgorithmIdentifierOwned {
                oid: ID_SHA_256,
                parameters: None,
            },
            dg_digests: vec![
                DataGroupHashDer {
                    number: 1,
                    value: OctetString::new(vec![0u8; 32]).unwrap(),
                },
                DataGroupHashDer {
                    number: 2,
                    value: OctetString::new(vec![1u8; 32]).unwrap(),
                },
            ],
            version_info: None,
        };
        let der = lds.to_der().unwrap();
        let so = SecurityObject::from_der(&der).unwrap();
        assert_eq!(so.hash_algorithm, ID_SHA_256);
        assert_eq!(so.entries.len(), 2);
        assert_eq!(so.entries[0].dg_number, 1);
        assert_eq!(so.entries[1].expected, vec![1u8; 32]);
        assert_eq!(so.lds_version, None);
    }

    #[test]
    fn malformed_security_object_is_rejected() {
        let err = SecurityObject::from_der(&[0x30, 0x02, 0x01, 0x01]).unwrap_err();
        assert!(matches!(err, ParseError::Der(_)));
    }
}
