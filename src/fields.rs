//! Field resolution: from raw data groups to typed identity values, driven
//! by a [`DocumentProfile`].
//!
//! Decoding failures here are data-quality signals, not protocol errors:
//! a malformed MRZ or an absent DG13 field resolves to `None` instead of
//! aborting, so partial decoding always succeeds for the fields that are
//! intact.

use std::collections::BTreeMap;

use base64::{prelude::BASE64_STANDARD, Engine};
use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    profile::{DecodeStrategy, DocumentProfile, FieldKind, FieldSelector},
    scan::DataGroups,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    /// Base64-encoded image bytes.
    Image(String),
}

/// All resolved fields of one document, keyed by field id.
pub type DecodedIdentity = BTreeMap<String, FieldValue>;

/// Resolve a single logical field. `None` when the field, its source data
/// group, or the addressed value is absent or malformed.
pub fn resolve_field(
    profile: &DocumentProfile,
    field_id: &str,
    dgs: &DataGroups,
) -> Option<FieldValue> {
    let binding = profile.fields.get(field_id)?;
    let source = profile.sources.get(binding.source)?;
    let raw = dgs.get(source.dg_number)?;

    match source.strategy {
        DecodeStrategy::Mrz => {
            let FieldSelector::Mrz(field) = binding.selector else {
                return None;
            };
            let zone = mrz::Td1::parse(raw)?;
            convert(binding.kind, zone.field(field)?)
        }
        DecodeStrategy::TlvPositional => {
            let FieldSelector::Tag(tag) = binding.selector else {
                return None;
            };
            let strings = dg13::field_strings(raw, tag);
            let text = strings.into_iter().nth(binding.sub_index.unwrap_or(0))?;
            convert(binding.kind, text)
        }
        DecodeStrategy::Biometric => {
            let image = biometric::extract_jpeg(raw)?;
            Some(FieldValue::Image(BASE64_STANDARD.encode(image)))
        }
    }
}

/// Resolve every field the profile declares, skipping the unresolvable.
pub fn resolve_all(profile: &DocumentProfile, dgs: &DataGroups) -> DecodedIdentity {
    profile
        .fields
        .keys()
        .filter_map(|field_id| {
            resolve_field(profile, field_id, dgs)
                .map(|value| (field_id.to_string(), value))
        })
        .collect()
}

fn convert(kind: FieldKind, text: String) -> Option<FieldValue> {
    match kind {
        FieldKind::Text | FieldKind::Enum => Some(FieldValue::Text(text)),
        FieldKind::Date => mrz::date(&text).map(FieldValue::Date),
        FieldKind::Biometric => None,
    }
}

pub mod mrz {
    use chrono::NaiveDate;

    use crate::profile::MrzField;
    use crate::tlv::{TagClass, TlvNode};

    /// ICAO MRZ layouts, told apart by zone length.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum MrzVariant {
        /// 3 lines x 30 characters (ID cards).
        Td1,
        /// 2 lines x 36 characters.
        Td2,
        /// 2 lines x 44 characters (passports).
        Td3,
    }

    impl MrzVariant {
        /// Classify a DG1 by the length of its machine readable zone.
        pub fn classify(dg1: &[u8]) -> Option<Self> {
            match unwrap_zone(dg1)?.len() {
                90 => Some(Self::Td1),
                72 => Some(Self::Td2),
                88 => Some(Self::Td3),
                _ => None,
            }
        }
    }

    /// A TD1 machine readable zone: three lines of thirty characters.
    pub struct Td1 {
        lines: [String; 3],
    }

    impl Td1 {
        /// Strip the DG1 envelope (application tag 1 around application tag
        /// 31) and take the zone text. Anything shorter than the 90 usable
        /// characters of TD1 is treated as corrupt.
        pub fn parse(dg1: &[u8]) -> Option<Self> {
            let text = unwrap_zone(dg1)?;
            if text.len() < 90 {
                return None;
            }
            let line = |i: usize| text[i * 30..(i + 1) * 30].to_string();
            Some(Self {
                lines: [line(0), line(1), line(2)],
            })
        }

        pub fn field(&self, field: MrzField) -> Option<String> {
            match field {
                MrzField::DocumentType => self.cut(0, 0, 2),
                MrzField::IssuingCountry => self.cut(0, 2, 5),
                MrzField::DocumentNumber => self.cut(0, 5, 14),
                MrzField::DateOfBirth => self.cut(1, 0, 6),
                MrzField::Gender => self.cut(1, 7, 8),
                MrzField::DateOfExpiry => self.cut(1, 8, 14),
                MrzField::Nationality => self.cut(1, 15, 18),
                MrzField::LastName => self.names().map(|(last, _)| last),
                MrzField::FirstName => self.names().and_then(|(_, first)| first),
            }
        }

        fn cut(&self, line: usize, start: usize, end: usize) -> Option<String> {
            let value = self.lines[line][start..end].trim_matches('<');
            (!value.is_empty()).then(|| value.to_string())
        }

        /// Line three holds the name: primary identifier, `<<`, secondary
        /// identifier, with single `<` as the space within each.
        fn names(&self) -> Option<(String, Option<String>)> {
            let line = &self.lines[2];
            let clean = |part: &str| {
                let text = part.replace('<', " ").trim().to_string();
                (!text.is_empty()).then_some(text)
            };
            match line.split_once("<<") {
                Some((last, first)) => Some((clean(last)?, clean(first))),
                None => Some((clean(line)?, None)),
            }
        }
    }

    fn unwrap_zone(dg1: &[u8]) -> Option<String> {
        let envelope = TlvNode::parse(dg1).ok()?;
        if envelope.class != TagClass::Application || envelope.number != 1 || !envelope.constructed
        {
            return None;
        }
        let zone = envelope.first_child()?.ok()?;
        if zone.class != TagClass::Application || zone.number != 31 {
            return None;
        }
        let text = std::str::from_utf8(zone.value).ok()?;
        text.is_ascii().then(|| text.to_string())
    }

    /// MRZ dates are YYMMDD. Two-digit years at or past 50 read as 19xx,
    /// the rest as 20xx.
    pub fn date(text: &str) -> Option<NaiveDate> {
        if text.len() != 6 || !text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let yy: i32 = text[0..2].parse().ok()?;
        let month: u32 = text[2..4].parse().ok()?;
        let day: u32 = text[4..6].parse().ok()?;
        let year = if yy >= 50 { 1900 + yy } else { 2000 + yy };
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

pub(crate) mod dg13 {
    use crate::tlv::{self, TagClass, TlvNode};

    const TAG_UTF8_STRING: u32 = 12;
    const TAG_PRINTABLE_STRING: u32 = 19;
    const TAG_IA5_STRING: u32 = 22;
    const TAG_SEQUENCE: u32 = 16;
    const TAG_SET: u32 = 17;

    /// String values stored under a proprietary field id, in document order.
    pub fn field_strings(dg13: &[u8], field_id: u8) -> Vec<String> {
        match find_field(dg13, field_id) {
            Some(element) => extract_strings(element),
            None => Vec::new(),
        }
    }

    /// Scan for the 3-byte marker `02 01 <id>` (an INTEGER-tagged field id)
    /// and return the complete TLV element that follows it.
    fn find_field(buf: &[u8], field_id: u8) -> Option<&[u8]> {
        let marker = [0x02, 0x01, field_id];
        let mut i = 0;
        while i + marker.len() <= buf.len() {
            if buf[i..i + marker.len()] == marker {
                let start = i + marker.len();
                let (_, end) = tlv::read_at(buf, start, 0).ok()?;
                return Some(&buf[start..end]);
            }
            i += 1;
        }
        None
    }

    fn is_string(node: &TlvNode) -> bool {
        node.class == TagClass::Universal
            && !node.constructed
            && matches!(
                node.number,
                TAG_UTF8_STRING | TAG_PRINTABLE_STRING | TAG_IA5_STRING
            )
    }

    fn is_container(node: &TlvNode) -> bool {
        node.class == TagClass::Universal
            && node.constructed
            && matches!(node.number, TAG_SEQUENCE | TAG_SET)
    }

    /// Collect string leaves in document order with an explicit work stack,
    /// descending through nested SEQUENCE/SET containers.
    fn extract_strings(element: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack: Vec<(&[u8], usize)> = vec![(element, 0)];

        while let Some((buf, pos)) = stack.pop() {
            if pos >= buf.len() {
                continue;
            }
            let Ok((node, end)) = tlv::read_at(buf, pos, 0) else {
                continue;
            };
            // Siblings resume after the current subtree is exhausted.
            stack.push((buf, end));
            if is_string(&node) {
                if let Ok(text) = std::str::from_utf8(node.value) {
                    out.push(text.to_string());
                }
            } else if is_container(&node) {
                stack.push((node.value, 0));
            }
        }
        out
    }
}

pub(crate) mod biometric {
    const JPEG_SOI: [u8; 3] = [0xff, 0xd8, 0xff];

    /// Everything from the JPEG start-of-image marker onward, or `None`
    /// when the buffer holds no JPEG at all.
    pub fn extract_jpeg(dg2: &[u8]) -> Option<&[u8]> {
        dg2.windows(JPEG_SOI.len())
            .position(|window| window == JPEG_SOI)
            .map(|offset| &dg2[offset..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileRegistry;
    use crate::tlv::push_length;

    pub(crate) fn dg1_from_lines(lines: [&str; 3]) -> Vec<u8> {
        let zone: String = lines.concat();
        let mut inner = vec![0x5f, 0x1f];
        push_length(&mut inner, zone.len());
        inner.extend_from_slice(zone.as_bytes());
        let mut out = vec![0x61];
        push_length(&mut out, inner.len());
        out.extend_from_slice(&inner);
        out
    }

    fn sample_dg1() -> Vec<u8> {
        dg1_from_lines([
            "I<VNM123456789<<<<<<<<<<<<<<<<",
            "9001013M3012319VNM<<<<<<<<<<<4",
            "NGUYEN<<VAN<AN<<<<<<<<<<<<<<<<",
        ])
    }

    fn utf8(text: &str) -> Vec<u8> {
        let mut out = vec![0x0c];
        push_length(&mut out, text.len());
        out.extend_from_slice(text.as_bytes());
        out
    }

    fn sequence(body: &[u8]) -> Vec<u8> {
        let mut out = vec![0x30];
        push_length(&mut out, body.len());
        out.extend_from_slice(body);
        out
    }

    pub(crate) fn sample_dg13() -> Vec<u8> {
        let mut entries = Vec::new();
        entries.extend(sequence(
            &[&[0x02, 0x01, 0x01][..], &utf8("Nguyễn Văn An")].concat(),
        ));
        entries.extend(sequence(
            &[&[0x02, 0x01, 0x02][..], &utf8("087123456789")].concat(),
        ));
        let parents = sequence(&[utf8("Nguyễn Văn Bình"), utf8("Trần Thị Cúc")].concat());
        entries.extend(sequence(&[&[0x02, 0x01, 0x0d][..], &parents].concat()));
        sequence(&entries)
    }

    #[test]
    fn td1_round_trip() {
        let mut dgs = DataGroups::default();
        dgs.insert(1, sample_dg1());
        let registry = ProfileRegistry::builtin();
        let profile = registry.get("VN-CCCD-2024").unwrap();

        let text = |field: &str| match resolve_field(profile, field, &dgs) {
            Some(FieldValue::Text(value)) => value,
            other => panic!("{field}: unexpected {other:?}"),
        };
        assert_eq!(text("documentNumber"), "123456789");
        assert_eq!(text("issuingCountry"), "VNM");
        assert_eq!(text("nationality"), "VNM");
        assert_eq!(text("gender"), "M");
        assert_eq!(text("lastName"), "NGUYEN");
        assert_eq!(text("firstName"), "VAN AN");

        assert_eq!(
            resolve_field(profile, "dateOfBirth", &dgs),
            Some(FieldValue::Date(
                chrono::NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()
            ))
        );
        assert_eq!(
            resolve_field(profile, "dateOfExpiry", &dgs),
            Some(FieldValue::Date(
                chrono::NaiveDate::from_ymd_opt(2030, 12, 31).unwrap()
            ))
        );
    }

    #[test]
    fn truncated_mrz_resolves_nothing() {
        // 89 characters of zone: one short of a valid TD1.
        let zone: String = "I<VNM123456789".chars().chain("<".repeat(75).chars()).collect();
        let mut inner = vec![0x5f, 0x1f];
        push_length(&mut inner, zone.len());
        inner.extend_from_slice(zone.as_bytes());
        let mut dg1 = vec![0x61];
        push_length(&mut dg1, inner.len());
        dg1.extend_from_slice(&inner);

        let mut dgs = DataGroups::default();
        dgs.insert(1, dg1);
        let registry = ProfileRegistry::builtin();
        let profile = registry.get("VN-CCCD-2024").unwrap();
        for field in ["documentNumber", "dateOfBirth", "gender", "lastName"] {
            assert_eq!(resolve_field(profile, field, &dgs), None, "{field}");
        }
    }

    #[test]
    fn dg13_sub_index_selection() {
        let mut dgs = DataGroups::default();
        dgs.insert(13, sample_dg13());
        let registry = ProfileRegistry::builtin();
        let profile = registry.get("VN-CCCD-2024").unwrap();

        assert_eq!(
            resolve_field(profile, "fatherName", &dgs),
            Some(FieldValue::Text("Nguyễn Văn Bình".to_string()))
        );
        assert_eq!(
            resolve_field(profile, "motherName", &dgs),
            Some(FieldValue::Text("Trần Thị Cúc".to_string()))
        );
        assert_eq!(
            resolve_field(profile, "fullName", &dgs),
            Some(FieldValue::Text("Nguyễn Văn An".to_string()))
        );
        // Field id 4 is not present in this document.
        assert_eq!(resolve_field(profile, "placeOfOrigin", &dgs), None);
    }

    #[test]
    fn jpeg_extraction_skips_prefix() {
        let mut dg2 = vec![0x75, 0x10, 0x7f, 0x61, 0x00];
        dg2.extend_from_slice(&[0xff, 0xd8, 0xff, 0xe0, 0x01, 0x02]);
        let mut dgs = DataGroups::default();
        dgs.insert(2, dg2);
        let registry = ProfileRegistry::builtin();
        let profile = registry.get("VN-CCCD-2024").unwrap();

        match resolve_field(profile, "portrait", &dgs) {
            Some(FieldValue::Image(b64)) => {
                let bytes = base64::prelude::BASE64_STANDARD.decode(b64).unwrap();
                assert_eq!(bytes, vec![0xff, 0xd8, 0xff, 0xe0, 0x01, 0x02]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_jpeg_marker_resolves_nothing() {
        let mut dgs = DataGroups::default();
        dgs.insert(2, vec![0x00, 0x01, 0x02, 0x03]);
        let registry = ProfileRegistry::builtin();
        let profile = registry.get("VN-CCCD-2024").unwrap();
        assert_eq!(resolve_field(profile, "portrait", &dgs), None);
    }

    #[test]
    fn resolve_all_skips_absent_sources() {
        let mut dgs = DataGroups::default();
        dgs.insert(1, sample_dg1());
        let registry = ProfileRegistry::builtin();
        let profile = registry.get("VN-CCCD-2024").unwrap();
        let identity = resolve_all(profile, &dgs);
        assert!(identity.contains_key("documentNumber"));
        assert!(!identity.contains_key("fullName"));
        assert!(!identity.contains_key("portrait"));
    }

    #[test]
    fn dg1_variant_classification() {
        assert_eq!(mrz::MrzVariant::classify(&sample_dg1()), Some(mrz::MrzVariant::Td1));

        // A TD3-sized zone: two lines of 44 characters.
        let line1 = format!("P<VNMNGUYEN<<VAN<AN{}", "<".repeat(25));
        let line2 = format!("1234567890VNM9001013M301231{}", "<".repeat(17));
        let td3 = dg1_from_lines([&line1, &line2, ""]);
        assert_eq!(mrz::MrzVariant::classify(&td3), Some(mrz::MrzVariant::Td3));

        assert_eq!(mrz::MrzVariant::classify(&[0x00, 0x01]), None);
    }

    #[test]
    fn mrz_date_century_window() {
        assert_eq!(
            mrz::date("490101"),
            chrono::NaiveDate::from_ymd_opt(2049, 1, 1)
        );
        assert_eq!(
            mrz::date("500101"),
            chrono::NaiveDate::from_ymd_opt(1950, 1, 1)
        );
        assert_eq!(mrz::date("991340"), None);
        assert_eq!(mrz::date("12345"), None);
    }
}
