use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Main configuration structure for StarSync
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// GitHub source settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Notion store settings
    #[serde(default)]
    pub notion: NotionConfig,

    /// AI summarizer settings
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// Username whose stars to sync (authenticated user if null)
    pub username: Option<String>,

    /// Personal access token (GITHUB_TOKEN environment variable if null)
    pub token: Option<String>,

    /// API base URL
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Maximum README length passed to the summarizer, in characters
    #[serde(default = "default_readme_max_length")]
    pub readme_max_length: usize,
}

/// Notion configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotionConfig {
    /// Integration token (NOTION_TOKEN environment variable if null)
    pub token: Option<String>,

    /// Data source to sync into; written by `starsync setup`
    #[serde(default)]
    pub data_source_id: String,

    /// API base URL
    #[serde(default = "default_notion_api_url")]
    pub api_url: String,
}

/// AI summarizer configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SummarizerConfig {
    /// API key (OPENAI_API_KEY environment variable if null)
    pub api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[serde(default = "default_summarizer_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_summarizer_model")]
    pub model: String,

    /// Output language for generated summaries
    #[serde(default = "default_summary_language")]
    pub language: String,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Maximum parallel repo-processing workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_readme_max_length() -> usize {
    30_000
}
fn default_notion_api_url() -> String {
    "https://api.notion.com/v1".to_string()
}
fn default_summarizer_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_summarizer_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_summary_language() -> String {
    "English".to_string()
}
fn default_concurrency() -> usize {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            username: None,
            token: None,
            api_url: default_github_api_url(),
            readme_max_length: default_readme_max_length(),
        }
    }
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            token: None,
            data_source_id: String::new(),
            api_url: default_notion_api_url(),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_summarizer_base_url(),
            model: default_summarizer_model(),
            language: default_summary_language(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GitHubConfig {
    /// Resolve the GitHub token from config or environment
    pub fn resolve_token(&self) -> Result<String> {
        resolve_secret(self.token.as_deref(), "GITHUB_TOKEN")
            .context("GitHub token not found. Set github.token in the config file or the GITHUB_TOKEN environment variable.")
    }
}

impl NotionConfig {
    /// Resolve the Notion token from config or environment
    pub fn resolve_token(&self) -> Result<String> {
        resolve_secret(self.token.as_deref(), "NOTION_TOKEN")
            .context("Notion token not found. Set notion.token in the config file or the NOTION_TOKEN environment variable.")
    }
}

impl SummarizerConfig {
    /// Resolve the summarizer API key from config or environment
    pub fn resolve_api_key(&self) -> Result<String> {
        resolve_secret(self.api_key.as_deref(), "OPENAI_API_KEY")
            .context("Summarizer API key not found. Set summarizer.api_key in the config file or the OPENAI_API_KEY environment variable.")
    }
}

fn resolve_secret(configured: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(value) = configured {
        if !value.is_empty() {
            return Ok(value.to_string());
        }
    }

    let value = env::var(env_var).with_context(|| format!("{env_var} is not set"))?;
    if value.is_empty() {
        anyhow::bail!("{env_var} is empty");
    }
    Ok(value)
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            // Create default config
            let config = Self::default();

            // Create config directory if it doesn't exist
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            // Save default config
            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("starsync").join("config.yml"))
    }
}
