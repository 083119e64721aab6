//! Conversation store implementations for braindump.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;

use braindump_core::ConversationStore;
use braindump_core::error::StoreError;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Open the store named by `backend` ("sqlite" or "memory").
pub async fn open(backend: &str, path: &str) -> Result<Arc<dyn ConversationStore>, StoreError> {
    match backend {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteStore::new(path).await?)),
        other => {
            let _ = path;
            Err(StoreError::Storage(format!("unsupported store backend: {other}")))
        }
    }
}
