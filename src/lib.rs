//! Passive Authentication for ICAO 9303 electronic identity documents.
//!
//! Given a Security Object (SOD), the raw data groups read from a document
//! chip, and optionally a CSCA trust anchor, this crate proves that the data
//! groups were signed by the document issuer and have not been altered, and
//! decodes typed identity fields out of the verified groups using per-country
//! document profiles.
//!
//! Everything is a pure function over byte buffers: no I/O, no shared
//! mutable state, and every verification call is independent of the next.

pub mod cert;
pub mod curves;
pub mod digest;
pub mod error;
pub mod fields;
pub mod mock;
pub mod profile;
pub mod scan;
pub mod signature;
pub mod sod;
pub mod tlv;
pub mod verify;

pub use error::{ParseError, VerifyError};
pub use fields::{resolve_all, resolve_field, DecodedIdentity, FieldValue};
pub use profile::{DocumentProfile, ProfileRegistry};
pub use scan::{DataGroups, DocumentScan};
pub use verify::{verify_document, verify_with_expiry, ChainStatus, VerificationReport};
