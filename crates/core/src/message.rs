//! Message and Conversation domain types.
//!
//! A conversation is the unit that owns the rolling summary; messages are an
//! append-only log hanging off it. The pipeline never edits or deletes a
//! message, it only reads the most recent ones back in creation order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool output
    Tool,
}

impl Role {
    /// Lowercase wire name, as stored and as sent to the model.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    /// Upper-case label used when rendering history lines (`USER: ...`).
    pub fn label(&self) -> &'static str {
        match self {
            Role::System => "SYSTEM",
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
            Role::Tool => "TOOL",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            other => Err(Error::Internal(format!("unknown role: {other}"))),
        }
    }
}

/// A single persisted message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Owning conversation
    pub conversation_id: ConversationId,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Optional metadata (raw gateway response, gateway name, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message for a conversation.
    pub fn new(conversation_id: &ConversationId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.clone(),
            role,
            content: content.into(),
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(conversation_id: &ConversationId, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(conversation_id: &ConversationId, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::Assistant, content)
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A conversation and its rolling summary.
///
/// Messages are not embedded; they are fetched from the store by recency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Optional topic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Bounded digest of older history. Written only by the summary compressor.
    #[serde(default)]
    pub running_summary: String,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the conversation (or its summary) last changed
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new conversation with an empty summary.
    pub fn new(topic: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            topic,
            running_summary: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input contract of the ingestion entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Existing conversation to continue; `None` starts a new one.
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,

    /// Free-form input text.
    pub text: String,
}

impl IngestRequest {
    pub fn new(conversation_id: Option<ConversationId>, text: impl Into<String>) -> Self {
        Self {
            conversation_id,
            text: text.into(),
        }
    }

    /// Boundary validation: runs before any pipeline stage.
    pub fn validate(&self) -> Result<(), Error> {
        if self.text.trim().is_empty() {
            return Err(Error::InvalidInput("text must not be empty".into()));
        }
        if let Some(id) = &self.conversation_id {
            if id.0.trim().is_empty() {
                return Err(Error::InvalidInput("conversation_id must not be blank".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let conv = ConversationId::new();
        let msg = Message::user(&conv, "Buy milk");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Buy milk");
        assert_eq!(msg.conversation_id, conv);
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn role_labels_are_uppercase() {
        assert_eq!(Role::User.label(), "USER");
        assert_eq!(Role::Assistant.label(), "ASSISTANT");
        assert_eq!("tool".parse::<Role>().unwrap(), Role::Tool);
        assert!("robot".parse::<Role>().is_err());
    }

    #[test]
    fn conversation_id_serializes_as_plain_string() {
        let id = ConversationId::from("abc-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc-123\"");
    }

    #[test]
    fn ingest_request_rejects_blank_text() {
        assert!(IngestRequest::new(None, "   ").validate().is_err());
        assert!(IngestRequest::new(Some(ConversationId::from(" ")), "hi").validate().is_err());
        assert!(IngestRequest::new(None, "Buy milk tomorrow").validate().is_ok());
    }

    #[test]
    fn ingest_request_conversation_id_is_optional() {
        let req: IngestRequest = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert!(req.conversation_id.is_none());
        assert_eq!(req.text, "hello");
    }
}
