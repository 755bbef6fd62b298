//! Upload a generated PDF and keep a local copy once the server accepts it.

use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};

use super::{read_envelope, ApiClient, ClientError};
use crate::models::{DocumentKind, GeneratedDocument};

/// A finished PDF ready to be stored against a patient.
#[derive(Debug, Clone)]
pub struct Submission {
    pub kind: DocumentKind,
    pub mrn: String,
    pub pdf: Vec<u8>,
    pub template_name: Option<String>,
}

/// Where the caller should go once the upload is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextView {
    PendingAppointments,
}

#[derive(Debug, Clone)]
pub struct Receipt {
    pub message: String,
    pub document: Option<GeneratedDocument>,
    /// Local copy of the uploaded bytes. `None` if writing it failed after
    /// the server had already stored the document.
    pub local_copy: Option<PathBuf>,
    pub next: NextView,
}

pub struct SubmissionClient {
    api: ApiClient,
    exports_dir: PathBuf,
}

impl SubmissionClient {
    pub fn new(api: ApiClient, exports_dir: impl Into<PathBuf>) -> Self {
        Self { api, exports_dir: exports_dir.into() }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// POST the PDF as multipart. Nothing is retried and nothing is written
    /// locally unless the server acknowledges storage.
    pub async fn submit(&self, submission: Submission) -> Result<Receipt, ClientError> {
        let path = match submission.kind {
            DocumentKind::Prescription => "/api/appointments/prescription",
            DocumentKind::LabReport => "/api/appointments/lab",
        };

        let file_name = export_file_name(submission.kind, &submission.mrn);
        let part = Part::bytes(submission.pdf.clone())
            .file_name(file_name.clone())
            .mime_str("application/pdf")
            .map_err(|e| ClientError::Http(e.to_string()))?;
        let mut form = Form::new().text("mrn", submission.mrn.clone()).part("file", part);
        if let Some(template) = &submission.template_name {
            form = form.text("templateName", template.clone());
        }

        tracing::info!(
            mrn = %submission.mrn,
            kind = %submission.kind,
            bytes = submission.pdf.len(),
            "Uploading document"
        );

        let response = self
            .api
            .http()
            .post(self.api.url(path))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.api.send_error(e))?;
        let envelope = read_envelope::<GeneratedDocument>(response).await?;

        // The server owns the document from here on
        let local_copy = match export_pdf_to_file(&submission.pdf, &file_name, &self.exports_dir) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Local copy written");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(
                    mrn = %submission.mrn,
                    dir = %self.exports_dir.display(),
                    error = %e,
                    "Document stored but the local copy could not be written"
                );
                None
            }
        };

        Ok(Receipt {
            message: envelope
                .message
                .unwrap_or_else(|| format!("{} uploaded successfully", submission.kind.label())),
            document: envelope.data,
            local_copy,
            next: NextView::PendingAppointments,
        })
    }
}

/// `Prescription_<mrn>.pdf` or `Lab_Report_<mrn>.pdf`, with anything outside
/// `[A-Za-z0-9_-]` in the MRN replaced by `_`.
pub fn export_file_name(kind: DocumentKind, mrn: &str) -> String {
    let safe: String = mrn
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    match kind {
        DocumentKind::Prescription => format!("Prescription_{safe}.pdf"),
        DocumentKind::LabReport => format!("Lab_Report_{safe}.pdf"),
    }
}

/// Write PDF bytes into `exports_dir`, creating it if needed.
pub fn export_pdf_to_file(pdf_bytes: &[u8], filename: &str, exports_dir: &Path) -> Result<PathBuf, ClientError> {
    std::fs::create_dir_all(exports_dir)?;
    let path = exports_dir.join(filename);
    std::fs::write(&path, pdf_bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{seed_patient, SAMPLE_PDF};
    use crate::client::tests::running_app;
    use crate::db::repository;
    use crate::models::{AppointmentStatus, Department};

    fn submission(kind: DocumentKind, mrn: &str) -> Submission {
        Submission { kind, mrn: mrn.into(), pdf: SAMPLE_PDF.to_vec(), template_name: Some("general.docx".into()) }
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(export_file_name(DocumentKind::Prescription, "M123"), "Prescription_M123.pdf");
        assert_eq!(export_file_name(DocumentKind::LabReport, "A/B 7"), "Lab_Report_A_B_7.pdf");
    }

    #[tokio::test]
    async fn prescription_upload_completes_patient_and_writes_copy() {
        let (app, mut server, api) = running_app().await;
        seed_patient(&app.state, "M123", Department::Gynae);
        let exports = app.dir.path().join("exports");
        let client = SubmissionClient::new(api, &exports);

        let receipt = client.submit(submission(DocumentKind::Prescription, "M123")).await.unwrap();
        assert_eq!(receipt.next, NextView::PendingAppointments);
        assert_eq!(receipt.message, "Prescription uploaded successfully");
        assert_eq!(std::fs::read(receipt.local_copy.unwrap()).unwrap(), SAMPLE_PDF);
        assert_eq!(receipt.document.unwrap().kind, DocumentKind::Prescription);

        let conn = app.state.open_db().unwrap();
        let patient = repository::get_patient_by_mrn(&conn, "M123").unwrap().unwrap();
        assert_eq!(patient.status, AppointmentStatus::Completed);
        assert_eq!(patient.template, "general.docx");

        server.shutdown();
    }

    #[tokio::test]
    async fn unwritable_exports_dir_still_acknowledges_upload() {
        let (app, mut server, api) = running_app().await;
        seed_patient(&app.state, "M123", Department::Gynae);
        // A regular file where the exports directory should be
        let exports = app.dir.path().join("exports");
        std::fs::write(&exports, b"not a directory").unwrap();
        let client = SubmissionClient::new(api, &exports);

        let receipt = client.submit(submission(DocumentKind::Prescription, "M123")).await.unwrap();
        assert!(receipt.local_copy.is_none());
        assert_eq!(receipt.message, "Prescription uploaded successfully");
        assert_eq!(app.stored_files(), 1);

        let conn = app.state.open_db().unwrap();
        let patient = repository::get_patient_by_mrn(&conn, "M123").unwrap().unwrap();
        assert_eq!(patient.status, AppointmentStatus::Completed);

        server.shutdown();
    }

    #[tokio::test]
    async fn repeated_upload_replaces_stored_document() {
        let (app, mut server, api) = running_app().await;
        seed_patient(&app.state, "M123", Department::Gynae);
        let client = SubmissionClient::new(api, app.dir.path().join("exports"));

        client.submit(submission(DocumentKind::Prescription, "M123")).await.unwrap();
        client.submit(submission(DocumentKind::Prescription, "M123")).await.unwrap();
        assert_eq!(app.stored_files(), 1);

        server.shutdown();
    }

    #[tokio::test]
    async fn rejected_upload_leaves_no_local_copy() {
        let (app, mut server, api) = running_app().await;
        let exports = app.dir.path().join("exports");
        let client = SubmissionClient::new(api, &exports);

        let err = client.submit(submission(DocumentKind::LabReport, "UNKNOWN")).await.unwrap_err();
        match err {
            ClientError::Server { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("UNKNOWN"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!exports.join("Lab_Report_UNKNOWN.pdf").exists());

        server.shutdown();
    }
}
