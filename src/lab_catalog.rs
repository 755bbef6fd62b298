//! Fixed lab test catalogs and per-test result dispatch.
//!
//! Every orderable test name maps to exactly one `TestKind` through
//! `TEST_TABLE`. Result entry, validation and report layout all branch on
//! that kind instead of on test names.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{AboGroup, BinaryOutcome, LabLocation, Rhesus};

pub const CBC_TEST: &str = "CBC (Complete Blood Count) Basic Hematology";
pub const BLOOD_GROUP_TEST: &str = "Blood Group";

/// How results for a test are entered and printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// Fixed rows with normal ranges (CBC).
    StructuredPanel,
    /// ABO group plus Rhesus factor.
    CategoricalPair,
    /// Positive / Negative.
    BinaryResult,
    /// Processed elsewhere; tracked only.
    ExternalOnly,
}

struct CatalogEntry {
    name: &'static str,
    location: LabLocation,
    kind: TestKind,
}

const TEST_TABLE: &[CatalogEntry] = &[
    CatalogEntry { name: CBC_TEST, location: LabLocation::InHouse, kind: TestKind::StructuredPanel },
    CatalogEntry { name: "Blood Sugar Random/Fasting", location: LabLocation::InHouse, kind: TestKind::BinaryResult },
    CatalogEntry { name: "HBsAg screening", location: LabLocation::InHouse, kind: TestKind::BinaryResult },
    CatalogEntry { name: "Anti HCV (Screening, ICT)", location: LabLocation::InHouse, kind: TestKind::BinaryResult },
    CatalogEntry { name: "Anti HIV - 1 & 2", location: LabLocation::InHouse, kind: TestKind::BinaryResult },
    CatalogEntry { name: "Hemoglobin", location: LabLocation::InHouse, kind: TestKind::BinaryResult },
    CatalogEntry { name: BLOOD_GROUP_TEST, location: LabLocation::InHouse, kind: TestKind::CategoricalPair },
    CatalogEntry { name: "ICT malaria", location: LabLocation::Outsourced, kind: TestKind::ExternalOnly },
    CatalogEntry { name: "LFTs", location: LabLocation::Outsourced, kind: TestKind::ExternalOnly },
    CatalogEntry { name: "RFTs", location: LabLocation::Outsourced, kind: TestKind::ExternalOnly },
    CatalogEntry { name: "Blood Urea", location: LabLocation::Outsourced, kind: TestKind::ExternalOnly },
    CatalogEntry { name: "ALT", location: LabLocation::Outsourced, kind: TestKind::ExternalOnly },
    CatalogEntry { name: "Serum Creatinine", location: LabLocation::Outsourced, kind: TestKind::ExternalOnly },
    CatalogEntry { name: "AST", location: LabLocation::Outsourced, kind: TestKind::ExternalOnly },
    CatalogEntry { name: "ALP", location: LabLocation::Outsourced, kind: TestKind::ExternalOnly },
    CatalogEntry { name: "Serum Uric Acid", location: LabLocation::Outsourced, kind: TestKind::ExternalOnly },
    CatalogEntry { name: "VDRL (Syphilis)", location: LabLocation::Outsourced, kind: TestKind::ExternalOnly },
];

/// One row of the CBC panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelRow {
    pub name: &'static str,
    pub range: &'static str,
    pub unit: &'static str,
}

pub const CBC_PANEL: [PanelRow; 12] = [
    PanelRow { name: "HB", range: "11.5 - 14.5", unit: "g/dl" },
    PanelRow { name: "Total RBC", range: "4 - 6", unit: "x10^12/l" },
    PanelRow { name: "HCT", range: "32 - 46", unit: "%" },
    PanelRow { name: "MCV", range: "75 - 85", unit: "fl" },
    PanelRow { name: "MCH", range: "26 - 32", unit: "pg" },
    PanelRow { name: "MCHC", range: "30 - 35", unit: "g/dl" },
    PanelRow { name: "Platelets", range: "140 - 450", unit: "x10^3/uL" },
    PanelRow { name: "WBC", range: "6 - 13", unit: "10^3/ul" },
    PanelRow { name: "Neutrophils", range: "20 - 75", unit: "%" },
    PanelRow { name: "Lymphocytes", range: "30 - 75", unit: "%" },
    PanelRow { name: "Eosinophils", range: "1 - 5", unit: "%" },
    PanelRow { name: "Monocytes", range: "2 - 6", unit: "%" },
];

#[derive(Error, Debug, PartialEq)]
pub enum LabError {
    #[error("Unknown lab test: {0}")]
    UnknownTest(String),

    #[error("Result given for a test that was not ordered: {0}")]
    NotOrdered(String),

    #[error("{test} takes a {expected:?} result")]
    KindMismatch { test: String, expected: TestKind },

    #[error("Unknown CBC row: {0}")]
    UnknownPanelRow(String),
}

pub fn in_house_tests() -> impl Iterator<Item = &'static str> {
    catalog(LabLocation::InHouse)
}

pub fn outsourced_tests() -> impl Iterator<Item = &'static str> {
    catalog(LabLocation::Outsourced)
}

fn catalog(location: LabLocation) -> impl Iterator<Item = &'static str> {
    TEST_TABLE
        .iter()
        .filter(move |e| e.location == location)
        .map(|e| e.name)
}

fn entry(test: &str) -> Option<&'static CatalogEntry> {
    TEST_TABLE.iter().find(|e| e.name == test)
}

/// Kind of `test` within an order placed at `order_location`.
/// Everything in an outsourced order is external, whatever its catalog.
pub fn test_kind(test: &str, order_location: LabLocation) -> Result<TestKind, LabError> {
    let entry = entry(test).ok_or_else(|| LabError::UnknownTest(test.to_string()))?;
    Ok(match order_location {
        LabLocation::Outsourced => TestKind::ExternalOnly,
        LabLocation::InHouse => entry.kind,
    })
}

/// Check every name against both catalogs and dedupe.
pub fn validate_order(tests: &[String]) -> Result<BTreeSet<String>, LabError> {
    tests
        .iter()
        .map(|t| {
            let name = t.trim();
            entry(name)
                .map(|e| e.name.to_string())
                .ok_or_else(|| LabError::UnknownTest(name.to_string()))
        })
        .collect()
}

/// A result value as entered. The shape must agree with the test's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    BloodGroup { abo: AboGroup, rhesus: Rhesus },
    Binary(BinaryOutcome),
    Panel(BTreeMap<String, String>),
}

/// Results checked against an order. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabResults {
    values: BTreeMap<String, ResultValue>,
}

impl LabResults {
    /// Validate raw entries against the ordered tests and their kinds.
    /// Tests without an entry print as "-".
    pub fn validate(
        entries: BTreeMap<String, ResultValue>,
        ordered: &BTreeSet<String>,
        location: LabLocation,
    ) -> Result<Self, LabError> {
        for (test, value) in &entries {
            let kind = test_kind(test, location)?;
            if !ordered.contains(test) {
                return Err(LabError::NotOrdered(test.clone()));
            }
            match (kind, value) {
                (TestKind::StructuredPanel, ResultValue::Panel(rows)) => {
                    if let Some(bad) = rows.keys().find(|r| !CBC_PANEL.iter().any(|p| p.name == r.as_str())) {
                        return Err(LabError::UnknownPanelRow(bad.clone()));
                    }
                }
                (TestKind::CategoricalPair, ResultValue::BloodGroup { .. }) => {}
                (TestKind::BinaryResult, ResultValue::Binary(_)) => {}
                (expected, _) => {
                    return Err(LabError::KindMismatch {
                        test: test.clone(),
                        expected,
                    })
                }
            }
        }
        Ok(Self { values: entries })
    }

    pub fn get(&self, test: &str) -> Option<&ResultValue> {
        self.values.get(test)
    }

    /// Printed value of one CBC row, "-" when absent.
    pub fn panel_value(&self, row: &str) -> &str {
        match self.values.get(CBC_TEST) {
            Some(ResultValue::Panel(rows)) => rows.get(row).map(String::as_str).unwrap_or("-"),
            _ => "-",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordered(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn catalogs_have_expected_sizes() {
        assert_eq!(in_house_tests().count(), 7);
        assert_eq!(outsourced_tests().count(), 10);
    }

    #[test]
    fn lookup_dispatches_by_kind() {
        assert_eq!(test_kind(CBC_TEST, LabLocation::InHouse).unwrap(), TestKind::StructuredPanel);
        assert_eq!(test_kind("Blood Group", LabLocation::InHouse).unwrap(), TestKind::CategoricalPair);
        assert_eq!(test_kind("HBsAg screening", LabLocation::InHouse).unwrap(), TestKind::BinaryResult);
        assert_eq!(test_kind("LFTs", LabLocation::InHouse).unwrap(), TestKind::ExternalOnly);
        assert_eq!(test_kind(CBC_TEST, LabLocation::Outsourced).unwrap(), TestKind::ExternalOnly);
        assert!(matches!(test_kind("MRI", LabLocation::InHouse), Err(LabError::UnknownTest(_))));
    }

    #[test]
    fn order_validation_rejects_unknown_and_dedupes() {
        let ok = validate_order(&["ALT".into(), " ALT ".into(), "Hemoglobin".into()]).unwrap();
        assert_eq!(ok, ordered(&["ALT", "Hemoglobin"]));
        assert_eq!(
            validate_order(&["X-Ray".into()]).unwrap_err(),
            LabError::UnknownTest("X-Ray".into())
        );
    }

    #[test]
    fn results_deserialize_by_shape() {
        let json = serde_json::json!({
            "Blood Group": { "abo": "AB", "rhesus": "Negative" },
            "Hemoglobin": "Positive",
            "CBC (Complete Blood Count) Basic Hematology": { "HB": "12.1", "WBC": "7" }
        });
        let entries: BTreeMap<String, ResultValue> = serde_json::from_value(json).unwrap();
        assert_eq!(
            entries["Blood Group"],
            ResultValue::BloodGroup { abo: AboGroup::AB, rhesus: Rhesus::Negative }
        );
        assert_eq!(entries["Hemoglobin"], ResultValue::Binary(BinaryOutcome::Positive));

        let results = LabResults::validate(
            entries,
            &ordered(&["Blood Group", "Hemoglobin", CBC_TEST]),
            LabLocation::InHouse,
        )
        .unwrap();
        assert_eq!(results.panel_value("HB"), "12.1");
        assert_eq!(results.panel_value("MCV"), "-");
    }

    #[test]
    fn mismatched_shapes_rejected() {
        let mut entries = BTreeMap::new();
        entries.insert("Blood Group".to_string(), ResultValue::Binary(BinaryOutcome::Negative));
        let err = LabResults::validate(entries, &ordered(&["Blood Group"]), LabLocation::InHouse)
            .unwrap_err();
        assert_eq!(
            err,
            LabError::KindMismatch { test: "Blood Group".into(), expected: TestKind::CategoricalPair }
        );
    }

    #[test]
    fn external_tests_take_no_results() {
        let mut entries = BTreeMap::new();
        entries.insert("ALT".to_string(), ResultValue::Binary(BinaryOutcome::Positive));
        assert!(matches!(
            LabResults::validate(entries, &ordered(&["ALT"]), LabLocation::InHouse),
            Err(LabError::KindMismatch { expected: TestKind::ExternalOnly, .. })
        ));
    }

    #[test]
    fn unordered_and_unknown_rows_rejected() {
        let mut entries = BTreeMap::new();
        entries.insert("Hemoglobin".to_string(), ResultValue::Binary(BinaryOutcome::Positive));
        assert_eq!(
            LabResults::validate(entries, &ordered(&[]), LabLocation::InHouse).unwrap_err(),
            LabError::NotOrdered("Hemoglobin".into())
        );

        let mut rows = BTreeMap::new();
        rows.insert("ESR".to_string(), "10".to_string());
        let mut entries = BTreeMap::new();
        entries.insert(CBC_TEST.to_string(), ResultValue::Panel(rows));
        assert_eq!(
            LabResults::validate(entries, &ordered(&[CBC_TEST]), LabLocation::InHouse).unwrap_err(),
            LabError::UnknownPanelRow("ESR".into())
        );
    }
}
