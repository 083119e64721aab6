//! ConversationStore trait: durable conversations, messages, notes and tasks.
//!
//! The pipeline only needs read/write by id plus "most recent N" retrieval.
//! Task writes go through a [`TaskBatch`], which is all-or-nothing: dropping
//! a batch without calling [`TaskBatch::commit`] discards every write made
//! through it.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{Conversation, ConversationId, Message};
use crate::note::Note;
use crate::task::{Task, TaskDraft, TaskId, TaskKey, TaskStatus};

/// The core store trait.
///
/// Implementations: SQLite, in-memory (tests and ephemeral runs).
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g. "sqlite", "memory").
    fn name(&self) -> &str;

    async fn create_conversation(&self, topic: Option<String>) -> Result<Conversation, StoreError>;

    async fn get_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError>;

    /// Replace the rolling summary of a conversation.
    async fn set_running_summary(&self, id: &ConversationId, summary: &str) -> Result<(), StoreError>;

    async fn append_message(&self, message: &Message) -> Result<(), StoreError>;

    /// The `limit` most recent messages of a conversation, newest first.
    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;

    async fn append_note(&self, note: &Note) -> Result<(), StoreError>;

    /// Audit trail for a conversation, oldest first.
    async fn notes(&self, id: &ConversationId) -> Result<Vec<Note>, StoreError>;

    /// Up to `limit` tasks, most recently updated first.
    async fn recent_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError>;

    /// Move a task through its lifecycle outside of reconciliation.
    async fn set_task_status(&self, id: TaskId, status: TaskStatus) -> Result<Task, StoreError>;

    /// Open an atomic task batch.
    async fn begin_task_batch(&self) -> Result<Box<dyn TaskBatch>, StoreError>;
}

/// Transaction-scoped view over the task table.
#[async_trait]
pub trait TaskBatch: Send {
    /// First task (lowest id) matching the key, including writes made
    /// earlier in this batch.
    async fn find_match(&mut self, key: &TaskKey) -> Result<Option<Task>, StoreError>;

    async fn insert(&mut self, draft: &TaskDraft) -> Result<Task, StoreError>;

    /// Overwrite a task from a draft; status becomes `New`.
    async fn update(&mut self, id: TaskId, draft: &TaskDraft) -> Result<Task, StoreError>;

    /// Make every write in the batch durable. Further calls fail.
    async fn commit(&mut self) -> Result<(), StoreError>;
}
