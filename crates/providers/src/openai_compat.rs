//! OpenAI-compatible model gateway.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/v1/chat/completions`. Non-streaming only: the pipeline waits for the
//! whole completion before parsing it.

use async_trait::async_trait;
use braindump_core::error::GatewayError;
use braindump_core::gateway::{GenerateOptions, Generation, ModelGateway, PromptSegment};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible model gateway.
pub struct OpenAiCompatGateway {
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
    default_temperature: f32,
    default_max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatGateway {
    /// Create a new gateway with the trait-level generation defaults.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: "gpt-4o-mini".into(),
            default_temperature: braindump_core::gateway::DEFAULT_TEMPERATURE,
            default_max_tokens: braindump_core::gateway::DEFAULT_MAX_TOKENS,
            client,
        })
    }

    /// Model used when the request does not name one.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Override the gateway-layer temperature / max_tokens defaults.
    pub fn with_defaults(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.default_temperature = temperature;
        self.default_max_tokens = max_tokens;
        self
    }

    fn to_api_messages(segments: &[PromptSegment]) -> Vec<ApiMessage> {
        segments
            .iter()
            .map(|s| ApiMessage {
                role: s.role.as_str().into(),
                content: s.content.clone(),
            })
            .collect()
    }

    fn request_body(&self, segments: &[PromptSegment], options: &GenerateOptions) -> ApiRequest {
        ApiRequest {
            model: options
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages: Self::to_api_messages(segments),
            temperature: options.temperature.unwrap_or(self.default_temperature),
            max_tokens: options.max_tokens.unwrap_or(self.default_max_tokens),
            stream: false,
        }
    }

    fn map_status(status: u16, body: String) -> GatewayError {
        match status {
            429 => GatewayError::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => GatewayError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ),
            408 | 504 => GatewayError::Timeout(format!("upstream returned {status}")),
            _ => GatewayError::ApiError {
                status_code: status,
                message: body,
            },
        }
    }
}

#[async_trait]
impl ModelGateway for OpenAiCompatGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        segments: &[PromptSegment],
        options: &GenerateOptions,
    ) -> Result<Generation, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(segments, options);

        debug!(
            gateway = %self.name,
            model = %body.model,
            segments = segments.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(e.to_string())
                } else {
                    GatewayError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model gateway returned error");
            return Err(Self::map_status(status, error_body));
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| GatewayError::ApiError {
            status_code: 200,
            message: format!("Failed to decode response: {e}"),
        })?;

        let api_response: ApiResponse =
            serde_json::from_value(raw.clone()).map_err(|e| GatewayError::ApiError {
                status_code: 200,
                message: format!("Unexpected response shape: {e}"),
            })?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?
            .message
            .content
            .unwrap_or_default();

        Ok(Generation { content, raw })
    }

    async fn health_check(&self) -> Result<bool, GatewayError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
