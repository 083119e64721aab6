//! # braindump core
//!
//! Domain types, traits, and error definitions for the braindump ingestion
//! pipeline. This crate has **no framework dependencies**: it defines the
//! domain model that the store, gateway and pipeline crates implement against.
//!
//! ## Seams
//!
//! The two external collaborators are traits defined here:
//! - [`ConversationStore`]: durable conversations, messages, notes and tasks
//! - [`ModelGateway`]: `generate(messages, options) -> text`
//!
//! Implementations live in `braindump-store` and `braindump-providers`, and
//! tests substitute in-process mocks.

pub mod error;
pub mod gateway;
pub mod message;
pub mod note;
pub mod store;
pub mod task;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GatewayError, Result, StoreError};
pub use gateway::{GenerateOptions, Generation, ModelGateway, PromptSegment};
pub use message::{Conversation, ConversationId, IngestRequest, Message, Role};
pub use note::{Note, NoteKind};
pub use store::{ConversationStore, TaskBatch};
pub use task::{Priority, Task, TaskDraft, TaskId, TaskKey, TaskStatus};
