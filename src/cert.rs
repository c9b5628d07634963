//! Certificate handling: extraction of the fields the verifier and the
//! report need, and DSC-against-CSCA chain validation.

use chrono::{DateTime, Utc};
use cms::cert::x509::certificate::CertificateInner;
use const_oid::ObjectIdentifier;
use der::{Decode, Encode};
use tracing::debug;
use x509_cert::time::Time;

use crate::{
    error::{ParseError, VerifyError},
    signature::{verify_signature, SignerPublicKey},
};

/// The slice of an X.509 certificate that passive authentication cares
/// about. Owns its bytes so the report can outlive the parsed SOD.
#[derive(Clone, Debug)]
pub struct CertificateRecord {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub spki_der: Vec<u8>,
    pub tbs_der: Vec<u8>,
    pub signature_algorithm: ObjectIdentifier,
    pub signature: Vec<u8>,
    pub der: Vec<u8>,
}

fn time_to_utc(time: &Time) -> Result<DateTime<Utc>, ParseError> {
    let duration = match time {
        Time::UtcTime(t) => t.to_unix_duration(),
        Time::GeneralTime(t) => t.to_unix_duration(),
    };
    DateTime::<Utc>::from_timestamp(duration.as_secs() as i64, 0).ok_or(ParseError::Malformed {
        offset: 0,
        reason: "certificate validity outside representable range",
    })
}

impl CertificateRecord {
    pub fn from_der(bytes: &[u8]) -> Result<Self, ParseError> {
        let cert = CertificateInner::from_der(bytes)?;
        Self::from_certificate(&cert)
    }

    pub fn from_certificate(cert: &CertificateInner) -> Result<Self, ParseError> {
        let tbs = &cert.tbs_certificate;
        Ok(Self {
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            not_before: time_to_utc(&tbs.validity.not_before)?,
            not_after: time_to_utc(&tbs.validity.not_after)?,
            spki_der: tbs.subject_public_key_info.to_der()?,
            tbs_der: tbs.to_der()?,
            signature_algorithm: cert.signature_algorithm.oid,
            signature: cert
                .signature
                .as_bytes()
                .ok_or(ParseError::Malformed {
                    offset: 0,
                    reason: "certificate signature is not a primitive BIT STRING",
                })?
                .to_vec(),
            der: cert.to_der()?,
        })
    }
}

/// Check that the DSC's TBS bytes verify under the CSCA's public key, using
/// the signature algorithm the DSC declares for itself.
pub fn validate_chain(
    dsc: &CertificateRecord,
    csca: &CertificateRecord,
) -> Result<bool, VerifyError> {
    debug!(issuer = %csca.subject, "validating document signer against trust anchor");
    let key = SignerPublicKey::from_spki_der(&csca.spki_der)?;
    verify_signature(
        &dsc.tbs_der,
        &dsc.signature,
        &key,
        &dsc.signature_algorithm,
    )
}
