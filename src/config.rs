use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "FrontDesk";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default bind address for `frontdesk serve`.
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// Default API base used by the generation commands.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";

/// Lifetime of a signed document link.
pub const DEFAULT_LINK_TTL_SECS: u64 = 300;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "frontdesk_lib=info,frontdesk=info,tower_http=warn"
}

/// Get the application data directory
/// ~/FrontDesk/ on all platforms, falling back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Resolved runtime configuration.
///
/// Built by the CLI from flags and `FRONTDESK_*` environment variables;
/// everything below the data directory is derived from it.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub api_url: String,
    pub signing_key: Vec<u8>,
    pub link_ttl: Duration,
}

impl AppConfig {
    /// Configuration rooted at `data_dir` with a fresh random signing key.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            bind: DEFAULT_BIND
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 5000))),
            data_dir,
            api_url: DEFAULT_API_URL.to_string(),
            signing_key: random_signing_key(),
            link_ttl: Duration::from_secs(DEFAULT_LINK_TTL_SECS),
        }
    }

    /// SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("database").join("frontdesk.db")
    }

    /// Root of the local content store (generated PDFs).
    pub fn storage_dir(&self) -> PathBuf {
        self.data_dir.join("storage")
    }

    /// Where the generation commands keep their local copy of each PDF.
    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    /// Persisted session slot (active role).
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }
}

/// 32 random bytes for signing document links.
pub fn random_signing_key() -> Vec<u8> {
    let bytes: [u8; 32] = rand::random();
    bytes.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("FrontDesk"));
    }

    #[test]
    fn derived_paths_live_under_data_dir() {
        let cfg = AppConfig::with_data_dir(PathBuf::from("/tmp/fd"));
        assert!(cfg.database_path().starts_with("/tmp/fd"));
        assert!(cfg.storage_dir().ends_with("storage"));
        assert!(cfg.exports_dir().ends_with("exports"));
        assert!(cfg.session_path().ends_with("session.json"));
    }

    #[test]
    fn default_bind_parses() {
        let cfg = AppConfig::with_data_dir(PathBuf::from("."));
        assert_eq!(cfg.bind.port(), 5000);
        assert_eq!(cfg.signing_key.len(), 32);
    }

    #[test]
    fn signing_keys_differ() {
        assert_ne!(random_signing_key(), random_signing_key());
    }
}
