//! `braindump serve`: Start the HTTP API server.

use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.server.port = port;
    }

    println!("braindump API");
    println!("   Listening: {}:{}", config.server.host, config.server.port);
    println!("   Store:     {} ({})", config.store.backend, config.store.database_path());
    println!("   Model:     {}", config.provider.default_model);
    if !config.has_api_key() {
        println!("   ⚠️  No API key configured; ingestion will fail until one is set");
    }

    braindump_gateway::start(config).await?;

    Ok(())
}
