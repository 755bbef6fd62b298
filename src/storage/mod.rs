//! Binary content storage for generated PDFs.
//!
//! Pointers live in SQLite; the bytes live behind a `ContentStore`. The
//! only implementation keeps files on local disk, and links handed to
//! clients are signed and expire.

pub mod local;
pub mod signing;

pub use local::LocalContentStore;
pub use signing::{LinkSigner, SignedLink};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage id: {0}")]
    InvalidId(String),

    #[error("Link expired")]
    LinkExpired,

    #[error("Link signature invalid")]
    InvalidSignature,
}

/// A stored object: the identifier used for deletion and signing, plus
/// the canonical (unsigned) path it is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub storage_id: String,
    pub url: String,
}

/// Where generated document bytes are kept.
pub trait ContentStore: Send + Sync {
    /// Store `bytes` under a fresh identifier. `prefix` groups objects by kind.
    fn put(&self, prefix: &str, bytes: &[u8]) -> Result<StoredObject, StorageError>;

    fn get(&self, storage_id: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove an object. Removing an absent object is `NotFound`.
    fn delete(&self, storage_id: &str) -> Result<(), StorageError>;
}

/// Path under which stored objects are served.
pub fn file_path_for(storage_id: &str) -> String {
    format!("/api/files/{storage_id}")
}
