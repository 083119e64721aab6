//! Semantic recall extension point.
//!
//! Intended for embedding-similarity retrieval of related content. The only
//! implementation today returns nothing; the assembler still renders the
//! section header so the payload layout stays stable.

use async_trait::async_trait;
use braindump_core::error::StoreError;
use braindump_core::message::Conversation;

#[async_trait]
pub trait RecallSource: Send + Sync {
    /// Chunks related to the conversation, best first.
    async fn recall(&self, conversation: &Conversation) -> Result<Vec<String>, StoreError>;
}

/// Always empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecall;

#[async_trait]
impl RecallSource for NoRecall {
    async fn recall(&self, _conversation: &Conversation) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}
