//! `GET /api/files/:storage_id?expires=&signature=` serves stored content
//! behind a signed, time-limited link.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::AppState;

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub expires: Option<String>,
    pub signature: Option<String>,
}

pub async fn serve(
    State(state): State<AppState>,
    Path(storage_id): Path<String>,
    Query(query): Query<LinkQuery>,
) -> Result<Response, ApiError> {
    let expires = query
        .expires
        .as_deref()
        .and_then(|e| e.parse::<i64>().ok())
        .ok_or_else(|| ApiError::Forbidden("Missing or invalid link expiry".into()))?;
    let signature = query
        .signature
        .as_deref()
        .ok_or_else(|| ApiError::Forbidden("Missing link signature".into()))?;

    state
        .signer
        .verify(&storage_id, expires, signature, chrono::Utc::now().timestamp())
        .inspect_err(|e| tracing::debug!(storage_id = %storage_id, error = %e, "Signed link refused"))?;

    let bytes = state.store.get(&storage_id)?;
    let mime = mime_guess::from_path(&storage_id).first_or_octet_stream();

    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CONTENT_DISPOSITION, format!("inline; filename=\"{storage_id}\"")),
        ],
        bytes,
    )
        .into_response())
}
