use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AppointmentStatus, CollectionStatus, Department, LabLocation, Sex};

/// Vitals as entered at the front desk. Free text, units implied by the form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vitals {
    pub weight: Option<String>,
    pub height: Option<String>,
    pub bp: Option<String>,
    pub pulse: Option<String>,
    pub temperature: Option<String>,
    pub gestation: Option<String>,
}

/// Lab work ordered for a visit. Results are entered client-side only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabOrder {
    pub location: LabLocation,
    pub tests: BTreeSet<String>,
    pub collection: CollectionStatus,
    pub report_date: Option<NaiveDate>,
}

/// One patient visit, keyed by MRN.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub id: Uuid,
    pub mrn: String,
    pub name: String,
    pub sex: Sex,
    pub age: String,
    pub phone: String,
    pub cnic: String,
    pub address: Option<String>,
    pub doctor: Department,
    #[serde(flatten)]
    pub vitals: Vitals,
    pub vco: bool,
    pub status: AppointmentStatus,
    pub date: NaiveDate,
    pub time_in: Option<String>,
    pub time_out: Option<String>,
    pub template: String,
    pub lab_order: Option<LabOrder>,
    pub created_at: NaiveDateTime,
}

/// Intake form payload for `POST /api/appointments/add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    pub mrn: String,
    pub name: String,
    pub sex: Sex,
    pub age: String,
    pub phone: String,
    pub cnic: String,
    #[serde(default)]
    pub address: Option<String>,
    pub doctor: Department,
    #[serde(flatten)]
    pub vitals: Vitals,
    #[serde(default = "default_vco")]
    pub vco: bool,
    /// Defaults to today when omitted.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time_in: Option<String>,
    #[serde(default)]
    pub time_out: Option<String>,
}

fn default_vco() -> bool {
    true
}

impl NewPatient {
    /// Required text fields that are present but blank, by wire name.
    pub fn blank_fields(&self) -> Vec<&'static str> {
        let mut blank = Vec::new();
        for (name, value) in [
            ("mrn", &self.mrn),
            ("name", &self.name),
            ("age", &self.age),
            ("phone", &self.phone),
            ("cnic", &self.cnic),
        ] {
            if value.trim().is_empty() {
                blank.push(name);
            }
        }
        blank
    }
}

const CLOCK_FORMATS: [&str; 4] = ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p"];

/// Parse a desk-entered time: `HH:MM`, `HH:MM:SS` or `h:MM AM|PM` in any case.
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    CLOCK_FORMATS.iter().find_map(|f| NaiveTime::parse_from_str(raw, f).ok())
}

/// `PUT /api/appointments/:id/time` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeUpdate {
    pub time_in: Option<String>,
    pub time_out: Option<String>,
}

/// `PUT /api/appointments/:id/lab` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabOrderUpdate {
    pub lab_location: LabLocation,
    pub labs: Vec<String>,
    #[serde(default = "default_collection")]
    pub lab_collection: CollectionStatus,
}

fn default_collection() -> CollectionStatus {
    CollectionStatus::Pending
}
