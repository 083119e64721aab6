//! `braindump ingest`: Run one brain dump through the pipeline.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use braindump_config::AppConfig;
use braindump_core::message::{ConversationId, IngestRequest};
use braindump_pipeline::Ingestor;
use tracing::debug;

pub async fn run(
    config_path: Option<&Path>,
    conversation: Option<String>,
    topic: Option<String>,
    text: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    // Check for API key early; give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    BRAINDUMP_API_KEY   (generic)");
        eprintln!("    OPENAI_API_KEY      (for OpenAI direct)");
        eprintln!("    OPENROUTER_API_KEY  (with BRAINDUMP_BASE_URL=https://openrouter.ai/api/v1)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let text = read_text(text)?;
    let store = super::open_store(&config).await?;
    let gateway = braindump_providers::build_from_config(&config)?;
    debug!(
        store = %config.store.backend,
        model = %config.provider.default_model,
        "Ingestion stack ready"
    );
    let ingestor = Arc::new(Ingestor::from_config(store, gateway, &config));

    let conversation_id = match (conversation, topic) {
        (Some(id), _) => Some(ConversationId(id)),
        (None, Some(topic)) => Some(ingestor.start_conversation(Some(topic)).await?.id),
        (None, None) => None,
    };

    let response = ingestor
        .ingest(IngestRequest::new(conversation_id, text))
        .await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    eprintln!(
        "{} created, {} updated, context {}/{} chars{}",
        response.tasks.created.len(),
        response.tasks.updated.len(),
        response.context.payload_chars,
        response.context.budget,
        if response.context.truncated { " (truncated)" } else { "" },
    );

    Ok(())
}

/// `-` means stdin.
fn read_text(arg: String) -> std::io::Result<String> {
    if arg != "-" {
        return Ok(arg);
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_text_passes_through() {
        assert_eq!(read_text("Buy milk".into()).unwrap(), "Buy milk");
    }
}
