//! API errors, rendered as failure envelopes with a matching status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::types::Envelope;
use crate::db::DatabaseError;
use crate::lab_catalog::LabError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                "An internal error occurred".to_string()
            }
            ApiError::BadRequest(m) | ApiError::NotFound(m) | ApiError::Conflict(m) | ApiError::Forbidden(m) => {
                m.clone()
            }
        };
        (self.status(), Json(Envelope::failure(message))).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => ApiError::NotFound(format!("No {entity_type} found for {id}")),
            DatabaseError::Duplicate { entity_type, key } => {
                ApiError::Conflict(format!("A {entity_type} with {key} already exists"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ApiError::NotFound(format!("File {id} not found")),
            StorageError::InvalidId(id) => ApiError::BadRequest(format!("Invalid file id {id}")),
            StorageError::LinkExpired => ApiError::Forbidden("Link expired".into()),
            StorageError::InvalidSignature => ApiError::Forbidden("Invalid link signature".into()),
            StorageError::Io(e) => ApiError::Internal(format!("Storage: {e}")),
        }
    }
}

impl From<LabError> for ApiError {
    fn from(err: LabError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn not_found_is_a_404_envelope() {
        let response = ApiError::NotFound("Prescription not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Prescription not found");
    }

    #[tokio::test]
    async fn internal_hides_detail() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["message"], "An internal error occurred");
    }

    #[test]
    fn duplicate_maps_to_conflict() {
        let err: ApiError = DatabaseError::Duplicate { entity_type: "patient".into(), key: "MRN M1".into() }.into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn storage_errors_map_by_kind() {
        assert_eq!(ApiError::from(StorageError::LinkExpired).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(StorageError::InvalidSignature).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(StorageError::NotFound("x".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(StorageError::InvalidId("../x".into())).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn lab_errors_are_bad_requests() {
        let err: ApiError = LabError::UnknownTest("Thyroid".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
