//! Model gateway implementations for braindump.
//!
//! All gateways implement the `braindump_core::ModelGateway` trait.
//! [`build_from_config`] picks the implementation from configuration.

pub mod openai_compat;

use std::sync::Arc;

use braindump_config::AppConfig;
use braindump_core::error::GatewayError;
use braindump_core::gateway::ModelGateway;

pub use openai_compat::OpenAiCompatGateway;

/// Build the configured gateway.
///
/// Fails only if the HTTP client cannot be constructed; a missing API key is
/// reported by the endpoint on first use.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn ModelGateway>, GatewayError> {
    let provider = &config.provider;
    let gateway = OpenAiCompatGateway::new(
        &provider.name,
        &provider.base_url,
        provider.api_key.clone().unwrap_or_default(),
        std::time::Duration::from_secs(provider.timeout_secs),
    )?
    .with_default_model(&provider.default_model)
    .with_defaults(provider.temperature, provider.max_tokens);
    Ok(Arc::new(gateway))
}
