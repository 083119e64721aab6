//! Error types for the braindump domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each external collaborator has its own error enum.

use thiserror::Error;

/// The top-level error type for all braindump operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model gateway errors ---
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Boundary validation ---
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the model call itself. Never retried by the pipeline.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by model gateway, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Task batch already finished")]
    BatchFinished,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_displays_correctly() {
        let err = Error::Gateway(GatewayError::ApiError {
            status_code: 503,
            message: "upstream unavailable".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[test]
    fn store_error_converts_into_top_level() {
        let err: Error = StoreError::QueryFailed("tasks table: locked".into()).into();
        assert!(matches!(err, Error::Store(StoreError::QueryFailed(_))));
        assert!(err.to_string().contains("locked"));
    }
}
