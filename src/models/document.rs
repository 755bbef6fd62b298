use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::DocumentKind;

/// Pointer to a stored prescription or lab report. At most one per (mrn, kind).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDocument {
    pub mrn: String,
    pub kind: DocumentKind,
    /// Content-store identifier, used for signed links and deletion.
    pub storage_id: String,
    pub url: String,
    pub template_name: Option<String>,
    pub uploaded_at: NaiveDateTime,
}
