//! Configuration loading, validation, and management for braindump.
//!
//! Loads configuration from `~/.braindump/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.braindump/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model gateway connection and gateway-layer defaults
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Overrides used for the task-extraction call
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Context window budgets (characters)
    #[serde(default)]
    pub context: ContextConfig,

    /// Rolling summary bounds
    #[serde(default)]
    pub summary: SummaryConfig,

    /// Persistence backend
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP API
    #[serde(default)]
    pub server: ServerConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("extraction", &self.extraction)
            .field("context", &self.context)
            .field("summary", &self.summary)
            .field("store", &self.store)
            .field("server", &self.server)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Gateway name used in logs and message metadata
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// OpenAI-compatible base URL (without `/chat/completions`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub default_model: String,

    /// Gateway-layer default temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Gateway-layer default max tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP transport timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    800
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            api_key: None,
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("default_model", &self.default_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_extraction_temperature")]
    pub temperature: f32,

    #[serde(default = "default_extraction_max_tokens")]
    pub max_tokens: u32,
}

fn default_extraction_temperature() -> f32 {
    0.1
}
fn default_extraction_max_tokens() -> u32 {
    1400
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            temperature: default_extraction_temperature(),
            max_tokens: default_extraction_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_total_chars")]
    pub total_chars: usize,

    #[serde(default = "default_recent_chars")]
    pub recent_chars: usize,

    #[serde(default = "default_task_chars")]
    pub task_chars: usize,

    #[serde(default = "default_recall_chars")]
    pub recall_chars: usize,

    #[serde(default = "default_recent_messages")]
    pub recent_messages: usize,

    #[serde(default = "default_snapshot_tasks")]
    pub snapshot_tasks: usize,
}

fn default_total_chars() -> usize {
    12_000
}
fn default_recent_chars() -> usize {
    6_000
}
fn default_task_chars() -> usize {
    4_000
}
fn default_recall_chars() -> usize {
    2_000
}
fn default_recent_messages() -> usize {
    30
}
fn default_snapshot_tasks() -> usize {
    300
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            total_chars: default_total_chars(),
            recent_chars: default_recent_chars(),
            task_chars: default_task_chars(),
            recall_chars: default_recall_chars(),
            recent_messages: default_recent_messages(),
            snapshot_tasks: default_snapshot_tasks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_summary_chars")]
    pub max_chars: usize,

    #[serde(default = "default_summary_messages")]
    pub window_messages: usize,
}

fn default_summary_chars() -> usize {
    6_000
}
fn default_summary_messages() -> usize {
    20
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_chars: default_summary_chars(),
            window_messages: default_summary_messages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database path; defaults to `~/.braindump/braindump.sqlite`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// Resolved SQLite path.
    pub fn database_path(&self) -> String {
        self.path.clone().unwrap_or_else(|| {
            AppConfig::config_dir()
                .join("braindump.sqlite")
                .display()
                .to_string()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42_618
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.braindump/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `BRAINDUMP_API_KEY`, then `OPENAI_API_KEY`, then `OPENROUTER_API_KEY`
    /// - `BRAINDUMP_MODEL`
    /// - `BRAINDUMP_BASE_URL`
    /// - `BRAINDUMP_DATABASE`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&Self::config_path())
    }

    /// Like [`AppConfig::load`], but from an explicit file.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = lookup("BRAINDUMP_API_KEY")
                .or_else(|| lookup("OPENAI_API_KEY"))
                .or_else(|| lookup("OPENROUTER_API_KEY"));
        }
        if let Some(model) = lookup("BRAINDUMP_MODEL") {
            self.provider.default_model = model;
        }
        if let Some(url) = lookup("BRAINDUMP_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(path) = lookup("BRAINDUMP_DATABASE") {
            self.store.path = Some(path);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".braindump")
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, t) in [
            ("provider.temperature", self.provider.temperature),
            ("extraction.temperature", self.extraction.temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 2.0"
                )));
            }
        }

        let ctx = &self.context;
        if ctx.total_chars == 0 || ctx.recent_chars == 0 {
            return Err(ConfigError::ValidationError(
                "context.total_chars and context.recent_chars must be > 0".into(),
            ));
        }
        for (name, budget) in [
            ("recent_chars", ctx.recent_chars),
            ("task_chars", ctx.task_chars),
            ("recall_chars", ctx.recall_chars),
        ] {
            if budget > ctx.total_chars {
                return Err(ConfigError::ValidationError(format!(
                    "context.{name} ({budget}) exceeds context.total_chars ({})",
                    ctx.total_chars
                )));
            }
        }

        if self.summary.max_chars == 0 {
            return Err(ConfigError::ValidationError(
                "summary.max_chars must be > 0".into(),
            ));
        }

        match self.store.backend.as_str() {
            "sqlite" | "memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown store backend: {other} (expected \"sqlite\" or \"memory\")"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.context.total_chars, 12_000);
        assert_eq!(config.context.recent_chars, 6_000);
        assert_eq!(config.context.task_chars, 4_000);
        assert_eq!(config.context.recall_chars, 2_000);
        assert_eq!(config.summary.max_chars, 6_000);
        assert_eq!(config.summary.window_messages, 20);
        assert_eq!(config.extraction.max_tokens, 1400);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.base_url, config.provider.base_url);
        assert_eq!(parsed.server.port, config.server.port);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
[context]
total_chars = 8000

[store]
backend = "memory"
"#,
        )
        .unwrap();
        assert_eq!(parsed.context.total_chars, 8000);
        assert_eq!(parsed.context.recent_chars, 6000);
        assert_eq!(parsed.store.backend, "memory");
        assert!((parsed.extraction.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.provider.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn sub_budget_larger_than_total_rejected() {
        let mut config = AppConfig::default();
        config.context.task_chars = 20_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("task_chars"));
    }

    #[test]
    fn unknown_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "postgres".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider.name, "openai");
    }

    #[test]
    fn load_from_file_parses_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.server.port, 9000);

        std::fs::write(&path, "[summary]\nmax_chars = 0\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));

        std::fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("BRAINDUMP_MODEL", "gpt-4o"),
            ("BRAINDUMP_DATABASE", "/tmp/bd.sqlite"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert!(config.has_api_key());
        assert_eq!(config.provider.default_model, "gpt-4o");
        assert_eq!(config.store.database_path(), "/tmp/bd.sqlite");
    }

    #[test]
    fn api_key_redacted_in_debug() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn config_path_under_config_dir() {
        let path = AppConfig::config_path();
        assert!(path.starts_with(AppConfig::config_dir()));
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn load_at_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[store]\nbackend = \"memory\"\n").unwrap();
        let config = AppConfig::load_at(&path).unwrap();
        assert_eq!(config.store.backend, "memory");
    }
}
