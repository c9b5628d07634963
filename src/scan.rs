//! Input surface: base64 document scans and the raw data group map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::error::ParseError;

/// A captured document as produced by a reader app: the SOD plus whichever
/// data groups were read from the chip, all base64 in transit.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentScan {
    #[serde_as(as = "Base64")]
    pub sod: Vec<u8>,
    /// Keys are `dg1` through `dg16`.
    #[serde_as(as = "BTreeMap<_, Base64>")]
    pub data_groups: BTreeMap<String, Vec<u8>>,
}

impl DocumentScan {
    pub fn data_groups(&self) -> Result<DataGroups, ParseError> {
        let mut dgs = DataGroups::default();
        for (key, bytes) in &self.data_groups {
            let number = parse_dg_key(key).ok_or(ParseError::Malformed {
                offset: 0,
                reason: "data group keys must be dg1 through dg16",
            })?;
            dgs.insert(number, bytes.clone());
        }
        Ok(dgs)
    }
}

fn parse_dg_key(key: &str) -> Option<u8> {
    let number: u8 = key.strip_prefix("dg")?.parse().ok()?;
    (1..=16).contains(&number).then_some(number)
}

/// Raw data groups keyed by number, borrowed by a single verification call.
#[derive(Clone, Debug, Default)]
pub struct DataGroups(BTreeMap<u8, Vec<u8>>);

impl DataGroups {
    pub fn insert(&mut self, dg_number: u8, bytes: Vec<u8>) {
        self.0.insert(dg_number, bytes);
    }

    pub fn get(&self, dg_number: u8) -> Option<&[u8]> {
        self.0.get(&dg_number).map(Vec::as_slice)
    }

    pub fn numbers(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(u8, Vec<u8>)> for DataGroups {
    fn from_iter<I: IntoIterator<Item = (u8, Vec<u8>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_keys_map_to_numbers() {
        let scan = DocumentScan {
            sod: vec![],
            data_groups: BTreeMap::from([
                ("dg1".to_string(), vec![1]),
                ("dg13".to_string(), vec![13]),
            ]),
        };
        let dgs = scan.data_groups().unwrap();
        assert_eq!(dgs.get(1), Some(&[1u8][..]));
        assert_eq!(dgs.get(13), Some(&[13u8][..]));
        assert_eq!(dgs.get(2), None);
    }

    #[test]
    fn bad_scan_keys_are_rejected() {
        for key in ["dg0", "dg17", "sod", "dg1x"] {
            let scan = DocumentScan {
                sod: vec![],
                data_groups: BTreeMap::from([(key.to_string(), vec![])]),
            };
            assert!(scan.data_groups().is_err(), "key {key} should be rejected");
        }
    }

    #[test]
    fn scan_json_round_trip() {
        let json = r#"{"sod":"AQI=","dataGroups":{"dg1":"YWJj"}}"#;
        let scan: DocumentScan = serde_json::from_str(json).unwrap();
        assert_eq!(scan.sod, vec![1, 2]);
        assert_eq!(scan.data_groups["dg1"], b"abc");
    }
}
