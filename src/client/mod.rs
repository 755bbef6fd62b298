//! HTTP client for the front-desk API, used by the generation commands.

pub mod submission;

pub use submission::{export_file_name, export_pdf_to_file, NextView, Receipt, Submission, SubmissionClient};

use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use crate::api::types::Envelope;
use crate::models::{PatientRecord, Role};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Cannot reach server at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    ResponseParsing(String),

    #[error("No appointment found for MRN {0}")]
    PatientNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Thin typed wrapper over the JSON endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub(crate) fn send_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_connect() {
            ClientError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            ClientError::Http(format!("Request timed out after {}s", self.timeout_secs))
        } else {
            ClientError::Http(e.to_string())
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Envelope<T>, ClientError> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        read_envelope(response).await
    }

    pub async fn get_patient(&self, id: Uuid) -> Result<PatientRecord, ClientError> {
        let envelope = self.get_json(&format!("/api/appointments/{id}"), &[]).await?;
        required_data(envelope)
    }

    /// Exact MRN lookup through the search endpoint.
    pub async fn find_patient_by_mrn(&self, mrn: &str) -> Result<PatientRecord, ClientError> {
        let envelope: Envelope<Vec<PatientRecord>> =
            self.get_json("/api/appointments/search", &[("query", mrn)]).await?;
        envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .find(|p| p.mrn == mrn)
            .ok_or_else(|| ClientError::PatientNotFound(mrn.to_string()))
    }

    pub async fn pending(&self, role: Role) -> Result<Vec<PatientRecord>, ClientError> {
        let envelope = self.get_json("/api/appointments/pending", &[("role", role.as_str())]).await?;
        Ok(envelope.data.unwrap_or_default())
    }
}

/// Decode an envelope, turning non-2xx statuses and `success: false` into
/// `ClientError::Server` with the server's message.
pub(crate) async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<Envelope<T>, ClientError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| ClientError::ResponseParsing(e.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_slice::<Envelope<serde_json::Value>>(&body)
            .ok()
            .and_then(|env| env.message)
            .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
        return Err(ClientError::Server { status: status.as_u16(), message });
    }

    let envelope: Envelope<T> =
        serde_json::from_slice(&body).map_err(|e| ClientError::ResponseParsing(e.to_string()))?;
    if !envelope.success {
        return Err(ClientError::Server {
            status: status.as_u16(),
            message: envelope.message.unwrap_or_default(),
        });
    }
    Ok(envelope)
}

fn required_data<T>(envelope: Envelope<T>) -> Result<T, ClientError> {
    envelope
        .data
        .ok_or_else(|| ClientError::ResponseParsing("response carried no data".into()))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::api::start_api_server;
    use crate::api::test_support::{seed_patient, TestApp};
    use crate::api::ApiServer;
    use crate::models::Department;

    /// A real server on a loopback ephemeral port.
    pub(crate) async fn running_app() -> (TestApp, ApiServer, ApiClient) {
        let app = TestApp::new();
        let server = start_api_server(app.state.clone(), SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let client = ApiClient::new(&server.base_url(), Duration::from_secs(10)).unwrap();
        (app, server, client)
    }

    #[test]
    fn trailing_slash_trimmed() {
        let client = ApiClient::new("http://127.0.0.1:5000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:5000");
        assert_eq!(client.url("/api/health"), "http://127.0.0.1:5000/api/health");
    }

    #[tokio::test]
    async fn fetches_patient_by_id_and_mrn() {
        let (app, mut server, client) = running_app().await;
        let seeded = seed_patient(&app.state, "M123", Department::Gynae);

        let by_id = client.get_patient(seeded.id).await.unwrap();
        assert_eq!(by_id.mrn, "M123");
        let by_mrn = client.find_patient_by_mrn("M123").await.unwrap();
        assert_eq!(by_mrn.id, seeded.id);

        server.shutdown();
    }

    #[tokio::test]
    async fn unknown_patient_errors() {
        let (_app, mut server, client) = running_app().await;
        let err = client.get_patient(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 404, .. }));
        let err = client.find_patient_by_mrn("NOPE").await.unwrap_err();
        assert!(matches!(err, ClientError::PatientNotFound(_)));
        server.shutdown();
    }

    #[tokio::test]
    async fn pending_by_role() {
        let (app, mut server, client) = running_app().await;
        seed_patient(&app.state, "P1", Department::Paediatrics);
        seed_patient(&app.state, "G1", Department::Gynae);
        let paeds = client.pending(Role::Paeds).await.unwrap();
        assert_eq!(paeds.len(), 1);
        assert_eq!(paeds[0].mrn, "P1");
        assert_eq!(client.pending(Role::Reception).await.unwrap().len(), 2);
        server.shutdown();
    }

    #[tokio::test]
    async fn unreachable_server_is_connection_error() {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(5)).unwrap();
        let err = client.pending(Role::Reception).await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(_) | ClientError::Http(_)));
    }
}
