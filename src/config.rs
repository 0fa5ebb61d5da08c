use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LabelerError, Result};
use crate::fallback::{default_rules, FallbackClassifier, FallbackRule};
use crate::registry::CategoryRegistry;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub suggestions: SuggestionConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Ollama,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: ModelProvider,
    /// Overrides the provider's default endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key (Gemini only)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Number of body characters included in the prompt
    #[serde(default = "default_body_char_limit")]
    pub body_char_limit: usize,
    #[serde(default = "default_include_sender")]
    pub include_sender: bool,
}

impl ModelConfig {
    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url,
            (None, ModelProvider::Ollama) => "http://localhost:11434",
            (None, ModelProvider::Gemini) => "https://generativelanguage.googleapis.com",
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            body_char_limit: default_body_char_limit(),
            include_sender: default_include_sender(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    #[serde(default)]
    pub categories: CategoryRegistry,
    /// Evaluated in order; the first matching rule wins
    #[serde(default = "default_rules")]
    pub fallback_rules: Vec<FallbackRule>,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            categories: CategoryRegistry::default(),
            fallback_rules: default_rules(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Gmail search query selecting candidate messages
    #[serde(default = "default_run_query")]
    pub query: String,
    /// How many candidate messages to fetch per run
    #[serde(default = "default_limit")]
    pub check_limit: usize,
    /// How many messages to classify per run
    #[serde(default = "default_limit")]
    pub classify_limit: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            query: default_run_query(),
            check_limit: default_limit(),
            classify_limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionConfig {
    /// Gmail search query selecting messages without a user label
    #[serde(default = "default_suggestion_query")]
    pub query: String,
    /// How many messages to fetch for analysis
    #[serde(default = "default_max_summaries")]
    pub sample_size: usize,
    /// Cap on summaries rendered into the prompt
    #[serde(default = "default_max_summaries")]
    pub max_summaries: usize,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            query: default_suggestion_query(),
            sample_size: default_max_summaries(),
            max_summaries: default_max_summaries(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dry_run: bool,
}

fn default_provider() -> ModelProvider {
    ModelProvider::Ollama
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_body_char_limit() -> usize {
    3000
}

fn default_include_sender() -> bool {
    true
}

fn default_run_query() -> String {
    "is:unread".to_string()
}

fn default_limit() -> usize {
    10
}

fn default_suggestion_query() -> String {
    "-has:userlabels".to_string()
}

fn default_max_summaries() -> usize {
    50
}

fn default_max_suggestions() -> usize {
    5
}

/// Gmail returns at most 500 ids per list page
const MAX_CHECK_LIMIT: usize = 500;

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LabelerError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            LabelerError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    LabelerError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            LabelerError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| LabelerError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        if model.model.trim().is_empty() {
            return Err(LabelerError::ConfigError(
                "model.model cannot be empty".to_string(),
            ));
        }
        let base_url = model.base_url();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(LabelerError::ConfigError(format!(
                "model.base_url must start with http:// or https://, got '{}'",
                base_url
            )));
        }
        if model.timeout_secs == 0 {
            return Err(LabelerError::ConfigError(
                "model.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if !(200..=3000).contains(&model.body_char_limit) {
            return Err(LabelerError::ConfigError(
                "model.body_char_limit must be between 200 and 3000".to_string(),
            ));
        }
        if model.provider == ModelProvider::Gemini && model.api_key_env.trim().is_empty() {
            return Err(LabelerError::ConfigError(
                "model.api_key_env cannot be empty for the gemini provider".to_string(),
            ));
        }

        if self.taxonomy.categories.is_empty() {
            return Err(LabelerError::ConfigError(
                "taxonomy.categories must list at least one category".to_string(),
            ));
        }
        FallbackClassifier::new(self.taxonomy.fallback_rules.clone())
            .validate(&self.taxonomy.categories)?;

        if self.run.check_limit == 0 || self.run.check_limit > MAX_CHECK_LIMIT {
            return Err(LabelerError::ConfigError(format!(
                "run.check_limit must be between 1 and {}",
                MAX_CHECK_LIMIT
            )));
        }
        if self.run.classify_limit == 0 {
            return Err(LabelerError::ConfigError(
                "run.classify_limit must be greater than 0".to_string(),
            ));
        }

        if self.suggestions.sample_size == 0 || self.suggestions.sample_size > MAX_CHECK_LIMIT {
            return Err(LabelerError::ConfigError(format!(
                "suggestions.sample_size must be between 1 and {}",
                MAX_CHECK_LIMIT
            )));
        }
        if self.suggestions.max_summaries == 0 {
            return Err(LabelerError::ConfigError(
                "suggestions.max_summaries must be greater than 0".to_string(),
            ));
        }
        if self.suggestions.max_suggestions == 0 {
            return Err(LabelerError::ConfigError(
                "suggestions.max_suggestions must be greater than 0".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        Self::default().save(path).await
    }
}
