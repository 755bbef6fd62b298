//! HTTP API for the front desk: intake, work queues, generated document
//! storage and retrieval.
//!
//! The router is composable: `api_router()` returns a `Router` that can be
//! mounted on any axum server instance; `start_api_server()` runs it.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use server::{start_api_server, ApiServer};
pub use types::{AppState, Envelope};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;
    use axum::Router;
    use tempfile::TempDir;

    use super::{api_router, AppState};
    use crate::db::repository;
    use crate::models::{Department, NewPatient, PatientRecord, Sex, Vitals};
    use crate::storage::{LinkSigner, LocalContentStore};

    pub(crate) const SAMPLE_PDF: &[u8] = b"%PDF-1.4\n% test document\n%%EOF\n";

    /// App state over a throwaway data directory.
    pub(crate) struct TestApp {
        pub state: AppState,
        pub dir: TempDir,
    }

    impl TestApp {
        pub(crate) fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = LocalContentStore::new(dir.path().join("storage")).unwrap();
            let state = AppState::new(
                dir.path().join("database").join("frontdesk.db"),
                Arc::new(store),
                LinkSigner::new(b"test-signing-key".to_vec(), Duration::from_secs(300)),
            );
            Self { state, dir }
        }

        pub(crate) fn router(&self) -> Router {
            api_router(self.state.clone())
        }

        /// Completed files in the content store.
        pub(crate) fn stored_files(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("storage"))
                .unwrap()
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|x| x == "pdf"))
                .count()
        }
    }

    pub(crate) fn seed_patient(state: &AppState, mrn: &str, doctor: Department) -> PatientRecord {
        let conn = state.open_db().unwrap();
        repository::insert_patient(
            &conn,
            &NewPatient {
                mrn: mrn.into(),
                name: format!("Patient {mrn}"),
                sex: Sex::Female,
                age: "30".into(),
                phone: "0300-0000000".into(),
                cnic: "35202-0000000-0".into(),
                address: Some("Rajanpur".into()),
                doctor,
                vitals: Vitals { bp: Some("120/80".into()), ..Vitals::default() },
                vco: false,
                date: None,
                time_in: Some("09:30".into()),
                time_out: None,
            },
        )
        .unwrap()
    }

    pub(crate) async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// `multipart/form-data` POST. Fields are `(name, file_name, bytes)`.
    pub(crate) fn multipart_request(uri: &str, fields: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        let boundary = "frontdesk-test-boundary";
        let mut body = Vec::new();
        for (name, file_name, bytes) in fields {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match file_name {
                Some(file) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file}\"\r\nContent-Type: application/pdf\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes()),
            }
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }
}
