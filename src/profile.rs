//! Declarative document profiles.
//!
//! A profile maps a country/version identifier to the data groups a document
//! carries and the way each logical identity field is pulled out of them.
//! The registry is built once at startup and only ever read afterwards, so
//! it can be shared freely across concurrent verifications.

use std::collections::BTreeMap;

use itertools::Itertools;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// DG1-style machine readable zone.
    Mrz,
    /// DG13-style proprietary TLV addressed by INTEGER field ids.
    TlvPositional,
    /// DG2-style embedded image.
    Biometric,
}

#[derive(Clone, Copy, Debug)]
pub struct SourceSpec {
    pub dg_number: u8,
    pub strategy: DecodeStrategy,
}

/// Named sub-fields of a TD1 machine readable zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MrzField {
    DocumentType,
    IssuingCountry,
    DocumentNumber,
    DateOfBirth,
    Gender,
    DateOfExpiry,
    Nationality,
    LastName,
    FirstName,
}

/// Where inside a source a field lives.
#[derive(Clone, Copy, Debug)]
pub enum FieldSelector {
    Mrz(MrzField),
    /// DG13 proprietary field id, the value of the INTEGER marker.
    Tag(u8),
    /// Index of the image inside a biometric data group.
    BiometricIndex(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Enum,
    Biometric,
}

#[derive(Clone, Copy, Debug)]
pub struct FieldBinding {
    /// Source name, a key of [`DocumentProfile::sources`].
    pub source: &'static str,
    pub selector: FieldSelector,
    /// Position among multiple values found at the selector, for combined
    /// fields such as father/mother name pairs.
    pub sub_index: Option<usize>,
    pub kind: FieldKind,
}

#[derive(Clone, Debug)]
pub struct DocumentProfile {
    pub profile_id: &'static str,
    pub doc_types: &'static [&'static str],
    pub sources: BTreeMap<&'static str, SourceSpec>,
    pub fields: BTreeMap<&'static str, FieldBinding>,
}

impl DocumentProfile {
    /// Distinct data group numbers this profile reads, in ascending order.
    /// Lets callers request exactly the groups they need from the chip.
    pub fn required_data_groups(&self) -> Vec<u8> {
        self.sources
            .values()
            .map(|source| source.dg_number)
            .sorted()
            .dedup()
            .collect()
    }
}

/// Immutable profile table. Construct once, inject where needed.
pub struct ProfileRegistry {
    profiles: BTreeMap<&'static str, DocumentProfile>,
}

impl ProfileRegistry {
    pub fn new(profiles: impl IntoIterator<Item = DocumentProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|profile| (profile.profile_id, profile))
                .collect(),
        }
    }

    /// Registry of the profiles shipped with the crate.
    pub fn builtin() -> Self {
        Self::new([vn_cccd_2024()])
    }

    pub fn get(&self, profile_id: &str) -> Option<&DocumentProfile> {
        self.profiles.get(profile_id)
    }

    pub fn profile_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.profiles.keys().copied()
    }
}

/// Vietnamese CCCD identity card, 2024 layout: TD1 MRZ in DG1, JPEG portrait
/// in DG2, extended biographic fields in the proprietary DG13 tree.
fn vn_cccd_2024() -> DocumentProfile {
    let sources = BTreeMap::from([
        (
            "mrz",
            SourceSpec {
                dg_number: 1,
                strategy: DecodeStrategy::Mrz,
            },
        ),
        (
            "extended",
            SourceSpec {
                dg_number: 13,
                strategy: DecodeStrategy::TlvPositional,
            },
        ),
        (
            "portrait",
            SourceSpec {
                dg_number: 2,
                strategy: DecodeStrategy::Biometric,
            },
        ),
    ]);

    let mrz = |field: MrzField, kind: FieldKind| FieldBinding {
        source: "mrz",
        selector: FieldSelector::Mrz(field),
        sub_index: None,
        kind,
    };
    let extended = |tag: u8, sub_index: Option<usize>| FieldBinding {
        source: "extended",
        selector: FieldSelector::Tag(tag),
        sub_index,
        kind: FieldKind::Text,
    };

    let fields = BTreeMap::from([
        ("documentType", mrz(MrzField::DocumentType, FieldKind::Text)),
        ("documentNumber", mrz(MrzField::DocumentNumber, FieldKind::Text)),
        ("issuingCountry", mrz(MrzField::IssuingCountry, FieldKind::Text)),
        ("dateOfBirth", mrz(MrzField::DateOfBirth, FieldKind::Date)),
        ("gender", mrz(MrzField::Gender, FieldKind::Enum)),
        ("dateOfExpiry", mrz(MrzField::DateOfExpiry, FieldKind::Date)),
        ("nationality", mrz(MrzField::Nationality, FieldKind::Text)),
        ("lastName", mrz(MrzField::LastName, FieldKind::Text)),
        ("firstName", mrz(MrzField::FirstName, FieldKind::Text)),
        ("fullName", extended(1, None)),
        ("personalIdNumber", extended(2, None)),
        ("placeOfOrigin", extended(4, None)),
        ("placeOfResidence", extended(5, None)),
        ("fatherName", extended(13, Some(0))),
        ("motherName", extended(13, Some(1))),
        (
            "portrait",
            FieldBinding {
                source: "portrait",
                selector: FieldSelector::BiometricIndex(0),
                sub_index: None,
                kind: FieldKind::Biometric,
            },
        ),
    ]);

    DocumentProfile {
        profile_id: "VN-CCCD-2024",
        doc_types: &["ID", "IC"],
        sources,
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_resolves_by_id() {
        let registry = ProfileRegistry::builtin();
        assert!(registry.get("VN-CCCD-2024").is_some());
        assert!(registry.get("XX-NONE-1999").is_none());
    }

    #[test]
    fn required_data_groups_are_distinct_and_sorted() {
        let registry = ProfileRegistry::builtin();
        let profile = registry.get("VN-CCCD-2024").unwrap();
        assert_eq!(profile.required_data_groups(), vec![1, 2, 13]);
    }

    #[test]
    fn synthetic_registry_is_injectable() {
        let registry = ProfileRegistry::new([]);
        assert!(registry.get("VN-CCCD-2024").is_none());
    }
}
