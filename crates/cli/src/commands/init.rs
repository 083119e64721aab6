//! `braindump init`: Write the default config file.

use std::path::Path;

use braindump_config::AppConfig;

pub async fn run(path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let default_path = AppConfig::config_path();
    let config_path = path.unwrap_or(&default_path);

    println!("braindump setup");
    println!("=================\n");

    if config_path.exists() && !force {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force.\n");
        return Ok(());
    }

    write_default(config_path)?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Add your API key to the [provider] section (or set OPENAI_API_KEY)");
    println!("   2. Run: braindump ingest \"Buy milk tomorrow\"\n");

    Ok(())
}

fn write_default(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_loadable_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        run(Some(&path), false).await.unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.context.total_chars, 12_000);
    }

    #[tokio::test]
    async fn existing_file_kept_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 1234\n").unwrap();

        run(Some(&path), false).await.unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap().server.port, 1234);

        run(Some(&path), true).await.unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap().server.port, 42_618);
    }
}
