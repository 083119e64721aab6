//! `braindump summary`: Print a conversation's rolling summary.

use std::path::Path;

use braindump_core::message::ConversationId;

pub async fn run(config_path: Option<&Path>, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config).await?;

    let conversation = store
        .get_conversation(&ConversationId::from(id))
        .await?
        .ok_or_else(|| format!("Conversation not found: {id}"))?;

    if let Some(topic) = &conversation.topic {
        println!("# {topic}\n");
    }
    if conversation.running_summary.is_empty() {
        println!("(empty summary)");
    } else {
        println!("{}", conversation.running_summary);
    }
    Ok(())
}
