mod env_manager;

use std::fs;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{PipelineError, Result};

pub use env_manager::{get_env_value, ApiKeys};

/// Main configuration struct for the pipeline
///
/// Every section has defaults, so a config file only needs to list what it
/// overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub access settings
    pub github: GitHubSettings,
    /// Generation backend and retry settings
    pub generation: GenerationSettings,
    /// Repository snapshot settings
    pub cache: CacheSettings,
    /// Token prices used by cost estimation
    pub pricing: PricingSettings,
    /// API keys, populated from the environment and never written back
    #[serde(skip)]
    pub api_keys: ApiKeys,
}

/// Settings for talking to the repository host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubSettings {
    /// REST API base URL
    pub api_base: String,
    /// Per-request timeout
    #[serde(with = "secs")]
    pub timeout: Duration,
    /// Attempts for transient failures
    pub retries: u32,
    /// Base delay between transient retries, multiplied by the attempt number
    #[serde(with = "millis")]
    pub retry_delay: Duration,
}

/// Settings for the generation backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Chat model (or Azure deployment) name
    pub model: String,
    /// Model used by the token counting endpoint
    pub token_count_model: String,
    /// Attempts before a segment is reported as exhausted
    pub max_attempts: u32,
    /// Fixed pause between invalid attempts
    #[serde(with = "millis")]
    pub retry_pause: Duration,
    /// Per-request timeout for backend calls
    #[serde(with = "secs")]
    pub request_timeout: Duration,
    /// Character ceiling for narration and slide content
    pub max_chars: usize,
    /// Token ceiling for narration and slide content
    pub max_tokens: usize,
    /// Maximum length of user-supplied instructions
    pub max_instruction_chars: usize,
}

/// Settings for repository snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of distinct repositories kept in memory
    pub capacity: usize,
    /// Maximum number of curated files fetched per repository
    pub max_curated_files: usize,
    /// Character ceiling applied to each curated file
    pub file_content_ceiling: usize,
}

/// Token prices in USD per million tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingSettings {
    /// Price of one million input tokens
    pub input_per_million: f64,
    /// Price of one million output tokens
    pub output_per_million: f64,
    /// Prompt overhead added to every estimate
    pub prompt_overhead_tokens: usize,
    /// Expected output size of one generation
    pub expected_output_tokens: usize,
}

impl Config {
    /// Loads configuration from the default config file location
    ///
    /// If the config file doesn't exist, returns the default configuration.
    /// API keys are always taken from the environment.
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| PipelineError::Config("Could not find config directory".into()))?;
        let config_path = config_dir.join("repocast").join("config.toml");

        if !config_path.exists() {
            return Ok(Self::from_env());
        }
        Self::from_path(&config_path)
    }

    /// Loads configuration from an explicit TOML file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config = Self::from_toml(&content)?;
        config.api_keys = ApiKeys::from_env();
        Ok(config)
    }

    /// Parses configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Default configuration with API keys read from the environment
    pub fn from_env() -> Self {
        Self {
            api_keys: ApiKeys::from_env(),
            ..Self::default()
        }
    }

    /// Validates limits that would otherwise make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        if self.generation.max_attempts == 0 {
            return Err(PipelineError::Config("generation.max_attempts must be at least 1".into()));
        }
        if self.cache.capacity == 0 {
            return Err(PipelineError::Config("cache.capacity must be at least 1".into()));
        }
        if self.generation.max_chars == 0 {
            return Err(PipelineError::Config("generation.max_chars must be positive".into()));
        }
        if self.pricing.input_per_million < 0.0 || self.pricing.output_per_million < 0.0 {
            return Err(PipelineError::Config("token prices cannot be negative".into()));
        }
        self.api_keys.ensure_tokens()
    }
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            timeout: Duration::from_secs(30),
            retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            token_count_model: "claude-3-5-sonnet-latest".to_string(),
            max_attempts: 3,
            retry_pause: Duration::from_secs(2),
            request_timeout: Duration::from_secs(300),
            max_chars: 250_000,
            max_tokens: 100_000,
            max_instruction_chars: 1000,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_curated_files: 10,
            file_content_ceiling: 50_000,
        }
    }
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            input_per_million: 3.0,
            output_per_million: 15.0,
            prompt_overhead_tokens: 3000,
            expected_output_tokens: 3500,
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let config = Config::from_toml(
            r#"
            [generation]
            model = "gpt-4o-mini"
            retry_pause = 0

            [cache]
            capacity = 8
            "#,
        )?;

        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.generation.retry_pause, Duration::ZERO);
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(config.cache.capacity, 8);
        assert_eq!(config.cache.file_content_ceiling, 50_000);
        assert_eq!(config.github.api_base, "https://api.github.com");
        Ok(())
    }

    #[test]
    fn test_from_path() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[github]\ntimeout = 5\nretries = 1\n")?;

        let config = Config::from_path(&path)?;
        assert_eq!(config.github.timeout, Duration::from_secs(5));
        assert_eq!(config.github.retries, 1);
        Ok(())
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.generation.max_attempts = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            Config::from_toml("[cache]\ncapacity = \"lots\""),
            Err(PipelineError::Config(_))
        ));
    }
}
