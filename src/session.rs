//! Explicit front-desk session: which role is signed in on this machine.
//!
//! Loaded once at startup and handed to whoever needs it. `logout` clears
//! both the value and the persisted slot.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Role;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session file unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session file corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Persisted {
    role: Option<Role>,
}

#[derive(Debug)]
pub struct SessionContext {
    path: PathBuf,
    role: Option<Role>,
}

impl SessionContext {
    /// Read the persisted role. A missing file means nobody is signed in.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let role = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Persisted>(&bytes)?.role,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), role = ?role, "Session loaded");
        Ok(Self { path, role })
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn login(&mut self, role: Role) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&Persisted { role: Some(role) })?;
        std::fs::write(&self.path, json)?;
        self.role = Some(role);
        tracing::info!(role = %role, "Signed in");
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(role) = self.role.take() {
            tracing::info!(role = %role, "Signed out");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_file_means_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionContext::load(dir.path().join("session.json")).unwrap();
        assert_eq!(session.role(), None);
    }

    #[test]
    fn login_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let mut session = SessionContext::load(&path).unwrap();
        session.login(Role::Gynae).unwrap();
        assert_eq!(session.role(), Some(Role::Gynae));

        let reloaded = SessionContext::load(&path).unwrap();
        assert_eq!(reloaded.role(), Some(Role::Gynae));
    }

    #[test]
    fn logout_clears_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut session = SessionContext::load(&path).unwrap();
        session.login(Role::Reception).unwrap();

        session.logout().unwrap();
        assert_eq!(session.role(), None);
        assert!(!path.exists());
        assert_eq!(SessionContext::load(&path).unwrap().role(), None);

        // Logging out twice is harmless
        session.logout().unwrap();
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(SessionContext::load(&path), Err(SessionError::Corrupt(_))));
    }

    #[test]
    fn unknown_role_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, br#"{"role":"admin"}"#).unwrap();
        assert!(matches!(SessionContext::load(&path), Err(SessionError::Corrupt(_))));
    }
}
