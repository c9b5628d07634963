use const_oid::{
    db::rfc5912::{
        ECDSA_WITH_SHA_224, ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512,
        ID_SHA_224, ID_SHA_256, ID_SHA_384, ID_SHA_512, SHA_224_WITH_RSA_ENCRYPTION,
        SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
    },
    ObjectIdentifier,
};
use sha2::Digest;
use smallvec::SmallVec;

use crate::error::VerifyError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sha2 {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl Sha2 {
    pub fn digest(&self, payload: impl AsRef<[u8]>) -> SmallVec<[u8; 64]> {
        match self {
            Sha2::Sha224 => SmallVec::from_slice(&sha2::Sha224::digest(payload)[..]),
            Sha2::Sha256 => SmallVec::from_slice(&sha2::Sha256::digest(payload)[..]),
            Sha2::Sha384 => SmallVec::from_slice(&sha2::Sha384::digest(payload)[..]),
            Sha2::Sha512 => SmallVec::from_slice(&sha2::Sha512::digest(payload)[..]),
        }
    }

    /// Hash implied by a combined signature algorithm identifier such as
    /// ecdsa-with-SHA384 or sha256WithRSAEncryption. Unknown identifiers
    /// fall back to SHA-256, the dominant choice in issued documents.
    pub fn from_signature_algo_oid(pair: &ObjectIdentifier) -> Self {
        match *pair {
            ECDSA_WITH_SHA_224 | SHA_224_WITH_RSA_ENCRYPTION => Self::Sha224,
            ECDSA_WITH_SHA_384 | SHA_384_WITH_RSA_ENCRYPTION => Self::Sha384,
            ECDSA_WITH_SHA_512 | SHA_512_WITH_RSA_ENCRYPTION => Self::Sha512,
            ECDSA_WITH_SHA_256 | SHA_256_WITH_RSA_ENCRYPTION => Self::Sha256,
            _ => Self::Sha256,
        }
    }

    /// Hash named directly by a digest algorithm identifier, as in the LDS
    /// security object header.
    pub fn from_digest_algo_oid(oid: &ObjectIdentifier) -> Result<Self, VerifyError> {
        match *oid {
            ID_SHA_224 => Ok(Self::Sha224),
            ID_SHA_256 => Ok(Self::Sha256),
            ID_SHA_384 => Ok(Self::Sha384),
            ID_SHA_512 => Ok(Self::Sha512),
            _ => Err(VerifyError::UnsupportedDigest { oid: *oid }),
        }
    }

    pub fn output_len(&self) -> usize {
        match self {
            Sha2::Sha224 => 28,
            Sha2::Sha256 => 32,
            Sha2::Sha384 => 48,
            Sha2::Sha512 => 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn sha256_known_answer() {
        let out = Sha2::Sha256.digest(b"abc");
        assert_eq!(
            out.as_slice(),
            hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn signature_oid_mapping_defaults_to_sha256() {
        assert_eq!(
            Sha2::from_signature_algo_oid(&ECDSA_WITH_SHA_384),
            Sha2::Sha384
        );
        let unrelated = ObjectIdentifier::new_unwrap("1.2.3.4");
        assert_eq!(Sha2::from_signature_algo_oid(&unrelated), Sha2::Sha256);
    }

    #[test]
    fn digest_oid_mapping_rejects_unknown() {
        assert_eq!(Sha2::from_digest_algo_oid(&ID_SHA_384).unwrap(), Sha2::Sha384);
        let md5 = ObjectIdentifier::new_unwrap("1.2.840.113549.2.5");
        assert!(matches!(
            Sha2::from_digest_algo_oid(&md5),
            Err(VerifyError::UnsupportedDigest { .. })
        ));
    }
}
