pub mod api; // HTTP API: intake, queues, document storage
pub mod client; // Typed client + multipart submission
pub mod config;
pub mod db;
pub mod generation; // Prescription / lab report pipeline
pub mod lab_catalog;
pub mod models;
pub mod render;
pub mod session;
pub mod storage;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the built-in filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
