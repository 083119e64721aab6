//! Subcommand implementations.

pub mod ingest;
pub mod init;
pub mod serve;
pub mod summary;
pub mod tasks;

use std::path::Path;
use std::sync::Arc;

use braindump_config::AppConfig;
use braindump_core::ConversationStore;

/// Load config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_at(path),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Open the configured store.
pub async fn open_store(
    config: &AppConfig,
) -> Result<Arc<dyn ConversationStore>, Box<dyn std::error::Error>> {
    let store =
        braindump_store::open(&config.store.backend, &config.store.database_path()).await?;
    Ok(store)
}
