//! Explicit-parameter elliptic curves for signature verification.
//!
//! Document signers in several countries use Brainpool curves, which the
//! pure-Rust provider stack (`p256`/`p384`) does not implement. For those the
//! verifier falls back to textbook ECDSA over a registry of explicit domain
//! parameters (RFC 5639). Registry lookups key on the named-curve OID carried
//! in the SubjectPublicKeyInfo.

use const_oid::{
    db::rfc5912::{SECP_256_R_1, SECP_384_R_1},
    ObjectIdentifier,
};
use num_bigint::BigUint;
use num_traits::Zero;

use crate::error::VerifyError;

pub const BRAINPOOL_P256R1: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.36.3.3.2.8.1.1.7");
pub const BRAINPOOL_P384R1: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.36.3.3.2.8.1.1.11");

/// True when the curve is handled by the platform provider stack rather
/// than the explicit-parameter fallback.
pub fn platform_supported(oid: &ObjectIdentifier) -> bool {
    *oid == SECP_256_R_1 || *oid == SECP_384_R_1
}

struct CurveSpec {
    oid: ObjectIdentifier,
    name: &'static str,
    p: &'static str,
    a: &'static str,
    b: &'static str,
    gx: &'static str,
    gy: &'static str,
    n: &'static str,
}

/// RFC 5639 section 3. Both curves have cofactor 1.
const CURVES: &[CurveSpec] = &[
    CurveSpec {
        oid: BRAINPOOL_P256R1,
        name: "brainpoolP256r1",
        p: "A9FB57DBA1EEA9BC3E660A909D838D726E3BF623D52620282013481D1F6E5377",
        a: "7D5A0975FC2C3057EEF67530417AFFE7FB8055C126DC5C6CE94A4B44F330B5D9",
        b: "26DC5C6CE94A4B44F330B5D9BBD77CBF958416295CF7E1CE6BCCDC18FF8C07B6",
        gx: "8BD2AEB9CB7E57CB2C4B482FFC81B7AFB9DE27E1E3BD23C23A4453BD9ACE3262",
        gy: "547EF835C3DAC4FD97F8461A14611DC9C27745132DED8E545C1D54C72F046997",
        n: "A9FB57DBA1EEA9BC3E660A909D838D718C397AA3B561A6F7901E0E82974856A7",
    },
    CurveSpec {
        oid: BRAINPOOL_P384R1,
        name: "brainpoolP384r1",
        p: "8CB91E82A3386D280F5D6F7E50E641DF152F7109ED5456B412B1DA197FB71123ACD3A729901D1A71874700133107EC53",
        a: "7BC382C63D8C150C3C72080ACE05AFA0C2BEA28E4FB22787139165EFBA91F90F8AA5814A503AD4EB04A8C7DD22CE2826",
        b: "04A8C7DD22CE28268B39B55416F0447C2FB77DE107DCD2A62E880EA53EEB62D57CB4390295DBC9943AB78696FA504C11",
        gx: "1D1C64F068CF45FFA2A63A81B7C13F6B8847A3E77EF14FE3DB7FCAFE0CBD10E8E826E03436D646AAEF87B2E247D4AF1E",
        gy: "8ABE1D7520F9C2A45CB1EB8E95CFD55262B70B29FEEC5864E19C054FF99129280E4646217791811142820341263C5315",
        n: "8CB91E82A3386D280F5D6F7E50E641DF152F7109ED5456B31F166E6CAC0425A7CF3AB6AF6B7FC3103B883202E9046565",
    },
];

/// Affine point; `None` is the point at infinity.
type Point = Option<(BigUint, BigUint)>;

/// Short-Weierstrass curve with explicit domain parameters.
pub struct Curve {
    pub name: &'static str,
    p: BigUint,
    a: BigUint,
    b: BigUint,
    gx: BigUint,
    gy: BigUint,
    n: BigUint,
}

fn uint(hex: &str) -> BigUint {
    BigUint::parse_bytes(hex.as_bytes(), 16).expect("infallible")
}

impl Curve {
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        CURVES.iter().find(|spec| spec.oid == *oid).map(|spec| Self {
            name: spec.name,
            p: uint(spec.p),
            a: uint(spec.a),
            b: uint(spec.b),
            gx: uint(spec.gx),
            gy: uint(spec.gy),
            n: uint(spec.n),
        })
    }

    /// Byte length of a field element, for splitting uncompressed SEC1 points.
    pub fn field_len(&self) -> usize {
        ((self.p.bits() as usize) + 7) / 8
    }

    /// ECDSA verification of `hash` against the public point `(qx, qy)`.
    ///
    /// Returns `Ok(false)` for any signature that fails to check out; a
    /// public point off the curve is an error rather than a failed check.
    pub fn verify(
        &self,
        hash: &[u8],
        qx: &BigUint,
        qy: &BigUint,
        r: &BigUint,
        s: &BigUint,
    ) -> Result<bool, VerifyError> {
        if r.is_zero() || s.is_zero() || *r >= self.n || *s >= self.n {
            return Ok(false);
        }
        if !self.on_curve(qx, qy) {
            return Err(VerifyError::BadPublicKey {
                reason: "public point is not on the curve",
            });
        }

        let e = self.scalar_from_hash(hash);
        // w = s^-1 mod n; the group order is prime, so Fermat inversion holds.
        let w = self.inv_mod(s, &self.n);
        let u1 = (&e * &w) % &self.n;
        let u2 = (r * &w) % &self.n;

        let g = Some((self.gx.clone(), self.gy.clone()));
        let q = Some((qx.clone(), qy.clone()));
        let point = self.add(&self.mul(&g, &u1), &self.mul(&q, &u2));

        match point {
            None => Ok(false),
            Some((x, _)) => Ok(x % &self.n == *r),
        }
    }

    /// Leftmost `bits(n)` bits of the hash, per SEC 1 section 4.1.4.
    fn scalar_from_hash(&self, hash: &[u8]) -> BigUint {
        let mut e = BigUint::from_bytes_be(hash);
        let hash_bits = (hash.len() as u64) * 8;
        let order_bits = self.n.bits();
        if hash_bits > order_bits {
            e >>= (hash_bits - order_bits) as usize;
        }
        e % &self.n
    }

    fn on_curve(&self, x: &BigUint, y: &BigUint) -> bool {
        if *x >= self.p || *y >= self.p {
            return false;
        }
        let lhs = (y * y) % &self.p;
        let rhs = (x * x * x + &self.a * x + &self.b) % &self.p;
        lhs == rhs
    }

    fn inv_mod(&self, v: &BigUint, modulus: &BigUint) -> BigUint {
        v.modpow(&(modulus - 2u32), modulus)
    }

    fn sub_mod(&self, lhs: &BigUint, rhs: &BigUint) -> BigUint {
        ((lhs + &self.p) - (rhs % &self.p)) % &self.p
    }

    fn add(&self, lhs: &Point, rhs: &Point) -> Point {
        let (x1, y1) = match lhs {
            None => return rhs.clone(),
            Some(p) => p,
        };
        let (x2, y2) = match rhs {
            None => return lhs.clone(),
            Some(p) => p,
        };

        let lambda = if x1 == x2 {
            if (y1 + y2) % &self.p == BigUint::zero() {
                return None;
            }
            // Doubling: lambda = (3x^2 + a) / 2y
            let num = (BigUint::from(3u32) * x1 * x1 + &self.a) % &self.p;
            let den = self.inv_mod(&((BigUint::from(2u32) * y1) % &self.p), &self.p);
            (num * den) % &self.p
        } else {
            let num = self.sub_mod(y2, y1);
            let den = self.inv_mod(&self.sub_mod(x2, x1), &self.p);
            (num * den) % &self.p
        };

        let x3 = self.sub_mod(&self.sub_mod(&((&lambda * &lambda) % &self.p), x1), x2);
        let y3 = self.sub_mod(&((&lambda * self.sub_mod(x1, &x3)) % &self.p), y1);
        Some((x3, y3))
    }

    fn mul(&self, point: &Point, scalar: &BigUint) -> Point {
        let mut result: Point = None;
        for i in (0..scalar.bits()).rev() {
            result = self.add(&result, &result);
            if scalar.bit(i) {
                result = self.add(&result, point);
            }
        }
        result
    }

    #[cfg(test)]
    fn generator(&self) -> Point {
        Some((self.gx.clone(), self.gy.clone()))
    }

    /// Textbook signing, test-only: used to exercise the verifier without a
    /// platform implementation of these curves.
    #[cfg(test)]
    pub(crate) fn sign_for_tests(
        &self,
        hash: &[u8],
        d: &BigUint,
        k: &BigUint,
    ) -> Option<(BigUint, BigUint)> {
        let e = self.scalar_from_hash(hash);
        let (x, _) = self.mul(&self.generator(), k)?;
        let r = x % &self.n;
        if r.is_zero() {
            return None;
        }
        let s = (self.inv_mod(k, &self.n) * (&e + &r * d)) % &self.n;
        if s.is_zero() {
            return None;
        }
        Some((r, s))
    }

    #[cfg(test)]
    pub(crate) fn public_point_for_tests(&self, d: &BigUint) -> (BigUint, BigUint) {
        self.mul(&self.generator(), d).expect("nonzero scalar")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Sha2;
    use num_traits::One;

    fn check_domain(oid: &ObjectIdentifier) {
        let curve = Curve::from_oid(oid).unwrap();
        assert!(curve.on_curve(&curve.gx, &curve.gy), "generator off curve");
        // Prime-order group: n * G must be the point at infinity.
        let ng = curve.mul(&curve.generator(), &curve.n.clone());
        assert!(ng.is_none(), "generator order mismatch");
        // Non-singular: 4a^3 + 27b^2 != 0.
        let d = (BigUint::from(4u32) * &curve.a * &curve.a * &curve.a
            + BigUint::from(27u32) * &curve.b * &curve.b)
            % &curve.p;
        assert!(!d.is_zero());
    }

    #[test]
    fn brainpool_p256r1_domain() {
        check_domain(&BRAINPOOL_P256R1);
    }

    #[test]
    fn brainpool_p384r1_domain() {
        check_domain(&BRAINPOOL_P384R1);
    }

    #[test]
    fn sign_then_verify_roundtrip() {
        let curve = Curve::from_oid(&BRAINPOOL_P256R1).unwrap();
        let hash = Sha2::Sha256.digest(b"passive authentication");
        let d = BigUint::parse_bytes(b"0102030405060708090a0b0c0d0e0f10", 16).unwrap();
        let k = BigUint::parse_bytes(b"2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b", 16).unwrap();

        let (qx, qy) = curve.public_point_for_tests(&d);
        let (r, s) = curve.sign_for_tests(&hash, &d, &k).unwrap();

        assert!(curve.verify(&hash, &qx, &qy, &r, &s).unwrap());

        let other = Sha2::Sha256.digest(b"tampered payload");
        assert!(!curve.verify(&other, &qx, &qy, &r, &s).unwrap());

        let bad_r = &r + 1u32;
        assert!(!curve.verify(&hash, &qx, &qy, &bad_r, &s).unwrap());
    }

    #[test]
    fn rejects_out_of_range_signature_scalars() {
        let curve = Curve::from_oid(&BRAINPOOL_P384R1).unwrap();
        let hash = Sha2::Sha384.digest(b"x");
        let d = BigUint::from(1234567u32);
        let (qx, qy) = curve.public_point_for_tests(&d);
        let zero = BigUint::zero();
        let n = curve.n.clone();
        assert!(!curve.verify(&hash, &qx, &qy, &zero, &n).unwrap());
    }

    #[test]
    fn rejects_point_off_curve() {
        let curve = Curve::from_oid(&BRAINPOOL_P256R1).unwrap();
        let hash = Sha2::Sha256.digest(b"x");
        let one = BigUint::one();
        let err = curve.verify(&hash, &one, &one, &one, &one);
        assert!(matches!(err, Err(VerifyError::BadPublicKey { .. })));
    }

    #[test]
    fn platform_capability_split() {
        assert!(platform_supported(&SECP_256_R_1));
        assert!(platform_supported(&SECP_384_R_1));
        assert!(!platform_supported(&BRAINPOOL_P256R1));
        assert!(!platform_supported(&BRAINPOOL_P384R1));
    }
}
