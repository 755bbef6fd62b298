//! Shared types for the HTTP API: application state and the JSON envelope.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::config::AppConfig;
use crate::db::sqlite::open_database;
use crate::storage::{ContentStore, LinkSigner, LocalContentStore, StorageError};

/// State handed to every handler. Connections are opened per request.
#[derive(Clone)]
pub struct AppState {
    pub db_path: PathBuf,
    pub store: Arc<dyn ContentStore>,
    pub signer: Arc<LinkSigner>,
}

impl AppState {
    pub fn new(db_path: PathBuf, store: Arc<dyn ContentStore>, signer: LinkSigner) -> Self {
        Self { db_path, store, signer: Arc::new(signer) }
    }

    /// Local store and database under the configured data directory.
    pub fn from_config(config: &AppConfig) -> Result<Self, StorageError> {
        let store = LocalContentStore::new(config.storage_dir())?;
        Ok(Self::new(
            config.database_path(),
            Arc::new(store),
            LinkSigner::new(config.signing_key.clone(), config.link_ttl),
        ))
    }

    pub fn open_db(&self) -> Result<Connection, ApiError> {
        open_database(&self.db_path).map_err(|e| ApiError::Internal(format!("Database: {e}")))
    }
}

/// Body of every JSON response: `{success, message?, count?, data?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, message: None, count: None, data: Some(data) }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T> Envelope<Vec<T>> {
    /// A list with its length in `count`.
    pub fn list(items: Vec<T>) -> Self {
        Self { success: true, message: None, count: Some(items.len()), data: Some(items) }
    }
}

impl Envelope<()> {
    pub fn done(message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), count: None, data: None }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()), count: None, data: None }
    }
}
