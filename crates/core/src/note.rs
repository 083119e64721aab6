//! Audit notes: raw input text, written once and never read back by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::ConversationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    BrainDump,
}

impl NoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteKind::BrainDump => "brain_dump",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub kind: NoteKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Note {
    pub fn brain_dump(conversation_id: &ConversationId, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: Some(conversation_id.clone()),
            kind: NoteKind::BrainDump,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}
