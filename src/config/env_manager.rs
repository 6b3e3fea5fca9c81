use crate::error::{PipelineError, Result};

/// Stores API keys for the repository host and the generation backends
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// GitHub token used when the request carries no credential of its own
    pub github_token: Option<String>,
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// Azure OpenAI endpoint; when set, Azure is used instead of OpenAI
    pub azure_endpoint: Option<String>,
    /// Azure OpenAI API key
    pub azure_api_key: Option<String>,
    /// Azure OpenAI API version
    pub azure_api_version: Option<String>,
    /// Anthropic key for the token counting endpoint
    pub anthropic_api_key: Option<String>,
}

impl ApiKeys {
    /// Reads all keys from the environment, treating empty values as unset
    pub fn from_env() -> Self {
        Self {
            github_token: get_env_value("GITHUB_TOKEN").or_else(|| get_env_value("GITHUB_PAT")),
            openai_api_key: get_env_value("OPENAI_API_KEY"),
            azure_endpoint: get_env_value("AZURE_OPENAI_ENDPOINT"),
            azure_api_key: get_env_value("AZURE_OPENAI_API_KEY"),
            azure_api_version: get_env_value("AZURE_OPENAI_API_VERSION"),
            anthropic_api_key: get_env_value("ANTHROPIC_API_KEY"),
        }
    }

    /// Validates that configured tokens are not blank
    pub fn ensure_tokens(&self) -> Result<()> {
        let keys = [
            ("GitHub token", &self.github_token),
            ("OpenAI API key", &self.openai_api_key),
            ("Azure OpenAI API key", &self.azure_api_key),
            ("Anthropic API key", &self.anthropic_api_key),
        ];
        for (name, key) in keys {
            if let Some(key) = key {
                if key.trim().is_empty() {
                    return Err(PipelineError::Config(format!("{} is empty", name)));
                }
            }
        }
        Ok(())
    }

    /// Whether an Azure deployment is fully configured
    pub fn uses_azure(&self) -> bool {
        self.azure_endpoint.is_some() && self.azure_api_key.is_some()
    }
}

/// Returns the environment value for `key`, or `None` when unset or empty
pub fn get_env_value(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
