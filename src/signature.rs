//! CMS signature verification for the SOD.
//!
//! The sequence follows RFC 5652: the signed attributes are re-encoded with
//! their original universal SET tag (inside `SignerInfo` they carry a `[0]`
//! IMPLICIT tag, but the signature was produced over the SET encoding), the
//! `messageDigest` attribute is checked against the encapsulated content
//! first, and only then is the asymmetric signature verified. NIST curves go
//! through the `p256`/`p384` provider stack; Brainpool curves fall back to
//! the explicit-parameter verifier in [`crate::curves`].

use cms::signed_data::SignedAttributes;
use const_oid::{
    db::rfc5912::{ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_256_R_1, SECP_384_R_1},
    ObjectIdentifier,
};
use der::{asn1::OctetStringRef, Decode, Encode, Sequence};
use ecdsa::signature::hazmat::PrehashVerifier;
use num_bigint::BigUint;
use rsa::{pkcs1::DecodeRsaPublicKey, Pkcs1v15Sign, RsaPublicKey};
use spki::SubjectPublicKeyInfoOwned;
use tracing::debug;

use crate::{
    curves::{platform_supported, Curve},
    digest::Sha2,
    error::VerifyError,
    sod::Sod,
};

pub const OID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// Public key material extracted from a SubjectPublicKeyInfo.
pub enum SignerPublicKey {
    Ec {
        curve: ObjectIdentifier,
        point: Vec<u8>,
    },
    Rsa {
        pkcs1_der: Vec<u8>,
    },
}

impl SignerPublicKey {
    pub fn from_spki_der(spki_der: &[u8]) -> Result<Self, VerifyError> {
        let spki = SubjectPublicKeyInfoOwned::from_der(spki_der)?;
        match spki.algorithm.oid {
            ID_EC_PUBLIC_KEY => {
                let params =
                    spki.algorithm
                        .parameters
                        .as_ref()
                        .ok_or(VerifyError::BadPublicKey {
                            reason: "EC key without named-curve parameters",
                        })?;
                let curve = params.decode_as::<ObjectIdentifier>().map_err(|_| {
                    VerifyError::BadPublicKey {
                        reason: "EC parameters are not a named curve",
                    }
                })?;
                Ok(Self::Ec {
                    curve,
                    point: spki.subject_public_key.raw_bytes().to_vec(),
                })
            }
            RSA_ENCRYPTION => Ok(Self::Rsa {
                pkcs1_der: spki.subject_public_key.raw_bytes().to_vec(),
            }),
            other => Err(VerifyError::UnsupportedCurve { oid: other }),
        }
    }
}

/// ECDSA-Sig-Value, RFC 5480.
#[derive(Sequence)]
struct EcdsaSigValue {
    r: der::asn1::Int,
    s: der::asn1::Int,
}

fn decode_ec_signature(signature_der: &[u8]) -> Option<(BigUint, BigUint)> {
    let sig = EcdsaSigValue::from_der(signature_der).ok()?;
    Some((
        BigUint::from_bytes_be(sig.r.as_bytes()),
        BigUint::from_bytes_be(sig.s.as_bytes()),
    ))
}

/// Verify the full SOD signature chain of evidence: messageDigest first,
/// then the asymmetric signature over the re-encoded signed attributes.
///
/// `Ok(false)` covers both a digest mismatch and a failed signature check;
/// `Err` means the check could not be performed (unsupported algorithm,
/// malformed key material, structural problems).
pub fn verify_sod(sod: &Sod) -> Result<bool, VerifyError> {
    let signer = sod.signer_info()?;
    let signed_attrs = signer
        .signed_attrs
        .as_ref()
        .ok_or(VerifyError::MissingSignedAttributes)?;

    // Re-encode with the universal SET tag; these are the signed bytes.
    let attrs_der = signed_attrs.to_der()?;

    let message_digest = message_digest_attr(signed_attrs)?;
    let hash = Sha2::from_signature_algo_oid(&signer.signature_algorithm.oid);
    let computed = hash.digest(sod.econtent());
    if computed.as_slice() != message_digest.as_slice() {
        debug!(
            expected = %hex::encode(&message_digest),
            computed = %hex::encode(&computed),
            "messageDigest does not match encapsulated content, skipping signature check"
        );
        return Ok(false);
    }

    let cert = sod.certificate()?;
    let spki_der = cert.tbs_certificate.subject_public_key_info.to_der()?;
    let key = SignerPublicKey::from_spki_der(&spki_der)?;
    verify_signature(
        &attrs_der,
        signer.signature.as_bytes(),
        &key,
        &signer.signature_algorithm.oid,
    )
}

/// Verify `signature_der` over `message` with the hash implied by
/// `sig_algo`. Shared by the SOD check and the certificate chain check.
pub fn verify_signature(
    message: &[u8],
    signature_der: &[u8],
    key: &SignerPublicKey,
    sig_algo: &ObjectIdentifier,
) -> Result<bool, VerifyError> {
    note_asymmetric_op();
    let hash = Sha2::from_signature_algo_oid(sig_algo);
    let digest = hash.digest(message);

    match key {
        SignerPublicKey::Ec { curve, point } if platform_supported(curve) => {
            if *curve == SECP_256_R_1 {
                verify_p256(point, &digest, signature_der)
            } else {
                debug_assert_eq!(*curve, SECP_384_R_1);
                verify_p384(point, &digest, signature_der)
            }
        }
        SignerPublicKey::Ec { curve, point } => {
            let explicit = Curve::from_oid(curve)
                .ok_or(VerifyError::UnsupportedCurve { oid: *curve })?;
            let lead = *point.first().ok_or(VerifyError::BadPublicKey {
                reason: "empty EC point",
            })?;
            if lead != 0x04 {
                return Err(VerifyError::UnsupportedKeyFormat { lead });
            }
            let coords = &point[1..];
            let flen = explicit.field_len();
            if coords.len() != 2 * flen {
                return Err(VerifyError::BadPublicKey {
                    reason: "EC point length does not match the curve field",
                });
            }
            let qx = BigUint::from_bytes_be(&coords[..flen]);
            let qy = BigUint::from_bytes_be(&coords[flen..]);
            let Some((r, s)) = decode_ec_signature(signature_der) else {
                return Ok(false);
            };
            debug!(curve = explicit.name, "verifying with explicit curve parameters");
            explicit.verify(&digest, &qx, &qy, &r, &s)
        }
        SignerPublicKey::Rsa { pkcs1_der } => {
            let key = RsaPublicKey::from_pkcs1_der(pkcs1_der).map_err(|_| {
                VerifyError::BadPublicKey {
                    reason: "invalid PKCS#1 RSA public key",
                }
            })?;
            let scheme = match hash {
                Sha2::Sha224 => Pkcs1v15Sign::new::<sha2::Sha224>(),
                Sha2::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
                Sha2::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
                Sha2::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
            };
            Ok(key.verify(scheme, &digest, signature_der).is_ok())
        }
    }
}

fn verify_p256(point: &[u8], digest: &[u8], signature_der: &[u8]) -> Result<bool, VerifyError> {
    let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(point).map_err(|_| {
        VerifyError::BadPublicKey {
            reason: "invalid SEC1 point for secp256r1",
        }
    })?;
    let Ok(sig) = p256::ecdsa::Signature::from_der(signature_der) else {
        return Ok(false);
    };
    Ok(key.verify_prehash(digest, &sig).is_ok())
}

fn verify_p384(point: &[u8], digest: &[u8], signature_der: &[u8]) -> Result<bool, VerifyError> {
    let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(point).map_err(|_| {
        VerifyError::BadPublicKey {
            reason: "invalid SEC1 point for secp384r1",
        }
    })?;
    let Ok(sig) = p384::ecdsa::Signature::from_der(signature_der) else {
        return Ok(false);
    };
    Ok(key.verify_prehash(digest, &sig).is_ok())
}

fn message_digest_attr(attrs: &SignedAttributes) -> Result<Vec<u8>, VerifyError> {
    for attr in attrs.iter() {
        if attr.oid == OID_MESSAGE_DIGEST {
            let value = attr
                .values
                .iter()
                .next()
                .ok_or(VerifyError::MissingAttribute {
                    oid: OID_MESSAGE_DIGEST,
                })?;
            let octets = value.decode_as::<OctetStringRef>()?;
            return Ok(octets.as_bytes().to_vec());
        }
    }
    Err(VerifyError::MissingAttribute {
        oid: OID_MESSAGE_DIGEST,
    })
}

fn note_asymmetric_op() {
    #[cfg(test)]
    test_instrumentation::ASYMMETRIC_OPS.with(|ops| ops.set(ops.get() + 1));
}
