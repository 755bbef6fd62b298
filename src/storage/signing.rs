use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{file_path_for, StorageError};

type HmacSha256 = Hmac<Sha256>;

/// A time-limited link to one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedLink {
    pub storage_id: String,
    /// Unix seconds after which the link is refused.
    pub expires: i64,
    pub signature: String,
}

impl SignedLink {
    /// Path plus query string, relative to the server root.
    pub fn path(&self) -> String {
        format!(
            "{}?expires={}&signature={}",
            file_path_for(&self.storage_id),
            self.expires,
            self.signature
        )
    }
}

/// HMAC-SHA256 over `"<storage_id>:<expires>"`.
#[derive(Clone)]
pub struct LinkSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for LinkSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSigner")
            .field("key", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl LinkSigner {
    pub fn new(key: Vec<u8>, ttl: Duration) -> Self {
        Self { key, ttl }
    }

    fn mac(&self, storage_id: &str, expires: i64) -> HmacSha256 {
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
        mac.update(storage_id.as_bytes());
        mac.update(b":");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    pub fn sign(&self, storage_id: &str, now: i64) -> SignedLink {
        let expires = now + self.ttl.as_secs() as i64;
        let tag = self.mac(storage_id, expires).finalize().into_bytes();
        SignedLink {
            storage_id: storage_id.to_string(),
            expires,
            signature: URL_SAFE_NO_PAD.encode(tag),
        }
    }

    /// Constant-time check of the signature, then expiry.
    pub fn verify(
        &self,
        storage_id: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), StorageError> {
        let tag = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| StorageError::InvalidSignature)?;
        self.mac(storage_id, expires)
            .verify_slice(&tag)
            .map_err(|_| StorageError::InvalidSignature)?;
        if now > expires {
            return Err(StorageError::LinkExpired);
        }
        Ok(())
    }
}
