//! Generated document endpoints: upload, signed open, and cascade delete.
//!
//! Uploads store content first, then swap the pointer inside a transaction
//! together with the patient-side effect. Content displaced by a replace is
//! removed only after that transaction commits; content written for a
//! failed transaction is removed straight away.

use axum::extract::{Multipart, Path, State};
use axum::response::Redirect;
use axum::Json;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{AppState, Envelope};
use crate::db::repository;
use crate::models::{DocumentKind, GeneratedDocument};
use crate::storage::StorageError;

/// Parsed multipart upload: `mrn`, `file`, optional `templateName`.
#[derive(Debug)]
pub struct UploadForm {
    pub mrn: String,
    pub file: Vec<u8>,
    pub template_name: Option<String>,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut mrn = None;
    let mut file = None;
    let mut template_name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "mrn" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                mrn = Some(text.trim().to_string()).filter(|m| !m.is_empty());
            }
            "templateName" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                template_name = Some(text.trim().to_string()).filter(|t| !t.is_empty());
            }
            "file" => {
                let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                file = Some(bytes.to_vec());
            }
            other => tracing::debug!(field = other, "Ignoring unknown upload field"),
        }
    }

    let mrn = mrn.ok_or_else(|| ApiError::BadRequest("MRN is required".into()))?;
    let file = file
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::BadRequest("File is required".into()))?;
    if !file.starts_with(b"%PDF") {
        return Err(ApiError::BadRequest("File must be a PDF".into()));
    }
    Ok(UploadForm { mrn, file, template_name })
}

/// `POST /api/appointments/prescription`
pub async fn upload_prescription(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Envelope<GeneratedDocument>>, ApiError> {
    let form = read_upload_form(multipart).await?;
    store_upload(&state, DocumentKind::Prescription, form)
}

/// `POST /api/appointments/lab`
pub async fn upload_lab(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Envelope<GeneratedDocument>>, ApiError> {
    let mut form = read_upload_form(multipart).await?;
    form.template_name = None;
    store_upload(&state, DocumentKind::LabReport, form)
}

fn store_upload(
    state: &AppState,
    kind: DocumentKind,
    form: UploadForm,
) -> Result<Json<Envelope<GeneratedDocument>>, ApiError> {
    let mut conn = state.open_db()?;
    if repository::get_patient_by_mrn(&conn, &form.mrn)?.is_none() {
        return Err(ApiError::NotFound(format!("No appointment found for MRN {}", form.mrn)));
    }

    let stored = state.store.put(kind.as_str(), &form.file)?;
    let doc = GeneratedDocument {
        mrn: form.mrn,
        kind,
        storage_id: stored.storage_id,
        url: stored.url,
        template_name: form.template_name,
        uploaded_at: chrono::Local::now().naive_local(),
    };

    let previous = match commit_upload(&mut conn, &doc) {
        Ok(previous) => previous,
        Err(e) => {
            if let Err(cleanup) = state.store.delete(&doc.storage_id) {
                tracing::warn!(storage_id = %doc.storage_id, error = %cleanup, "Orphaned upload could not be removed");
            }
            return Err(e);
        }
    };

    if let Some(old) = &previous {
        if let Err(e) = state.store.delete(&old.storage_id) {
            tracing::warn!(storage_id = %old.storage_id, error = %e, "Replaced content could not be removed");
        }
    }

    tracing::info!(
        mrn = %doc.mrn,
        kind = %kind,
        storage_id = %doc.storage_id,
        replaced = previous.is_some(),
        "Document stored"
    );
    let message = format!("{} uploaded successfully", kind.label());
    Ok(Json(Envelope::ok(doc).with_message(message)))
}

/// Pointer swap plus the patient-side effect, atomically.
fn commit_upload(conn: &mut Connection, doc: &GeneratedDocument) -> Result<Option<GeneratedDocument>, ApiError> {
    let tx = conn.transaction()?;
    let previous = repository::upsert_document(&tx, doc)?;
    match doc.kind {
        DocumentKind::Prescription => repository::complete_with_template(&tx, &doc.mrn, doc.template_name.as_deref())?,
        DocumentKind::LabReport => repository::set_lab_report_date(&tx, &doc.mrn, doc.uploaded_at.date())?,
    }
    tx.commit()?;
    Ok(previous)
}

/// `GET /api/appointments/openPrescription/:mrn`
pub async fn open_prescription(State(state): State<AppState>, Path(mrn): Path<String>) -> Result<Redirect, ApiError> {
    open_document(&state, &mrn, DocumentKind::Prescription)
}

/// `GET /api/appointments/openLab/:mrn`
pub async fn open_lab(State(state): State<AppState>, Path(mrn): Path<String>) -> Result<Redirect, ApiError> {
    open_document(&state, &mrn, DocumentKind::LabReport)
}

fn open_document(state: &AppState, mrn: &str, kind: DocumentKind) -> Result<Redirect, ApiError> {
    let conn = state.open_db()?;
    let doc = repository::get_document(&conn, mrn, kind)?
        .ok_or_else(|| ApiError::NotFound(format!("{} not found", kind.label())))?;
    let link = state.signer.sign(&doc.storage_id, chrono::Utc::now().timestamp());
    Ok(Redirect::temporary(&link.path()))
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub mrn: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOutcome {
    pub kind: DocumentKind,
    pub content_removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub mrn: String,
    pub patient_deleted: bool,
    pub documents: Vec<DocumentOutcome>,
}

/// `POST /api/appointments/delete`
///
/// Content removal is best effort and reported per document. Pointer and
/// patient rows are removed regardless.
pub async fn delete(
    State(state): State<AppState>,
    Json(request): Json<DeleteRequest>,
) -> Result<Json<Envelope<DeleteReport>>, ApiError> {
    let mrn = request.mrn.trim().to_string();
    if mrn.is_empty() {
        return Err(ApiError::BadRequest("MRN is required".into()));
    }

    let mut conn = state.open_db()?;
    let patient = repository::get_patient_by_mrn(&conn, &mrn)?;
    let docs = repository::get_documents_for_mrn(&conn, &mrn)?;
    if patient.is_none() && docs.is_empty() {
        return Err(ApiError::NotFound(format!("No records found for MRN {mrn}")));
    }

    let mut outcomes = Vec::with_capacity(docs.len());
    for doc in &docs {
        let outcome = match state.store.delete(&doc.storage_id) {
            // Already gone is as good as removed
            Ok(()) | Err(StorageError::NotFound(_)) => {
                DocumentOutcome { kind: doc.kind, content_removed: true, error: None }
            }
            Err(e) => {
                tracing::warn!(mrn = %mrn, storage_id = %doc.storage_id, error = %e, "Stored content not removed");
                DocumentOutcome { kind: doc.kind, content_removed: false, error: Some(e.to_string()) }
            }
        };
        outcomes.push(outcome);
    }

    let tx = conn.transaction()?;
    for doc in &docs {
        repository::delete_document(&tx, &mrn, doc.kind)?;
    }
    let patient_deleted = repository::delete_patient_by_mrn(&tx, &mrn)?;
    tx.commit()?;

    let partial = outcomes.iter().any(|o| !o.content_removed);
    tracing::info!(mrn = %mrn, documents = docs.len(), patient_deleted, partial, "Cascade delete finished");

    let message = if partial {
        format!("Records for MRN {mrn} deleted; some stored files could not be removed")
    } else {
        format!("Records for MRN {mrn} deleted")
    };
    Ok(Json(Envelope::ok(DeleteReport { mrn, patient_deleted, documents: outcomes }).with_message(message)))
}
