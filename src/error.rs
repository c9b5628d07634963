use const_oid::ObjectIdentifier;
use thiserror::Error;

/// Structural failures while decoding the security object or a certificate.
///
/// Always fatal to the current verification call.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed ASN.1 at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },

    /// The SOD neither starts with a bare SEQUENCE nor with the ICAO
    /// application wrapper. The offending tag byte is kept for diagnostics.
    #[error("unsupported security object wrapper tag {tag:#04x}")]
    UnsupportedWrapper { tag: u8 },

    #[error("SignedData carries no encapsulated content")]
    MissingContent,

    #[error("expected exactly one SignerInfo, found {count}")]
    SignerCount { count: usize },

    #[error("SignedData carries no usable certificate")]
    MissingCertificate,

    #[error(transparent)]
    Der(#[from] der::Error),
}

/// Failures while checking the CMS signature or the certificate chain.
///
/// These are distinct from a verification that ran and returned `false`:
/// an `Err` means the check could not be carried out at all.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("signed attributes are missing attribute {oid}")]
    MissingAttribute { oid: ObjectIdentifier },

    #[error("SignerInfo carries no signed attributes")]
    MissingSignedAttributes,

    #[error("unsupported curve or signature algorithm {oid}")]
    UnsupportedCurve { oid: ObjectIdentifier },

    #[error("unsupported public key encoding, leading byte {lead:#04x}")]
    UnsupportedKeyFormat { lead: u8 },

    #[error("unsupported digest algorithm {oid}")]
    UnsupportedDigest { oid: ObjectIdentifier },

    #[error("malformed subject public key: {reason}")]
    BadPublicKey { reason: &'static str },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Der(#[from] der::Error),
}
