//! ModelGateway trait: the abstraction over the language model transport.
//!
//! The pipeline hands the gateway an ordered list of role-tagged segments and
//! gets generated text back. Transport, auth and wire format are the
//! implementation's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::message::Role;

/// Defaults applied by gateways when the caller leaves an option unset.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 800;

/// One role-tagged prompt segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSegment {
    pub role: Role,
    pub content: String,
}

impl PromptSegment {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-call options. `None` means "use the gateway default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerateOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A completed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text, unparsed.
    pub content: String,

    /// Opaque gateway metadata (typically the decoded response body).
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// The core gateway trait.
///
/// Implementations: OpenAI-compatible HTTP endpoint; scripted mocks in tests.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// A human-readable name (e.g. "openai", "openrouter").
    fn name(&self) -> &str;

    /// Generate a completion for the given segments.
    async fn generate(
        &self,
        segments: &[PromptSegment],
        options: &GenerateOptions,
    ) -> std::result::Result<Generation, GatewayError>;

    /// Can we reach the model endpoint?
    async fn health_check(&self) -> std::result::Result<bool, GatewayError> {
        Ok(true)
    }
}
