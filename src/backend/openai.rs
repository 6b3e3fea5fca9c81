use std::path::Path;
use std::time::Duration;
use async_openai::config::{AzureConfig, Config as ClientConfig, OpenAIConfig};
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use log::{debug, info, warn};

use super::{AnthropicTokenCounter, GenerationBackend, HeuristicCounter, TokenCounter};
use crate::config::Config;
use crate::error::{PipelineError, Result};

const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

/// Chat-completions backend for OpenAI or Azure OpenAI
#[derive(Clone)]
pub struct OpenAiBackend<C: ClientConfig = OpenAIConfig> {
    client: Client<C>,
    model: String,
    timeout: Duration,
    counter: Option<AnthropicTokenCounter>,
}

impl OpenAiBackend<OpenAIConfig> {
    /// Backend talking to api.openai.com
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self::with_client_config(OpenAIConfig::new().with_api_key(api_key), model)
    }
}

impl OpenAiBackend<AzureConfig> {
    /// Backend talking to an Azure OpenAI deployment
    pub fn azure(endpoint: &str, api_key: &str, deployment: &str, api_version: Option<&str>) -> Self {
        let config = AzureConfig::new()
            .with_api_base(endpoint)
            .with_api_key(api_key)
            .with_deployment_id(deployment)
            .with_api_version(api_version.unwrap_or(DEFAULT_AZURE_API_VERSION));
        Self::with_client_config(config, deployment)
    }
}

impl<C: ClientConfig + Send + Sync + 'static> OpenAiBackend<C> {
    /// Backend over an arbitrary client configuration
    pub fn with_client_config(config: C, model: &str) -> Self {
        Self {
            client: Client::with_config(config).with_backoff(no_backoff()),
            model: model.to_string(),
            timeout: Duration::from_secs(300),
            counter: None,
        }
    }

    /// Caps the wall time of one submission
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Uses a model-accurate counter instead of the character heuristic
    pub fn with_token_counter(mut self, counter: AnthropicTokenCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    async fn complete(&self, instruction: &str, content: String) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(instruction)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(content)
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;
        if let Some(usage) = &response.usage {
            debug!(
                "{} used {} prompt and {} completion tokens",
                self.model, usage.prompt_tokens, usage.completion_tokens
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| PipelineError::Backend("Model returned no content".into()))
    }
}

#[async_trait]
impl<C: ClientConfig + Send + Sync + 'static> TokenCounter for OpenAiBackend<C> {
    async fn count_tokens(&self, text: &str) -> Result<usize> {
        match &self.counter {
            Some(counter) => counter.count_tokens(text).await,
            None => Ok(HeuristicCounter::estimate(text)),
        }
    }
}

#[async_trait]
impl<C: ClientConfig + Send + Sync + 'static> GenerationBackend for OpenAiBackend<C> {
    async fn submit(&self, content: &Path, instruction: &str) -> Result<String> {
        let content = tokio::fs::read_to_string(content).await?;
        info!("Submitting {} chars to {}", content.len(), self.model);

        tokio::time::timeout(self.timeout, self.complete(instruction, content))
            .await
            .map_err(|_| {
                PipelineError::Backend(format!("{} did not answer within {:?}", self.model, self.timeout))
            })?
    }
}

/// The client would otherwise resend throttled requests for up to 15 minutes
fn no_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

/// Builds the backend described by the configuration and environment
///
/// Azure wins when both Azure and OpenAI keys are present.
pub fn backend_from_config(config: &Config) -> Result<Box<dyn GenerationBackend>> {
    let keys = &config.api_keys;
    let settings = &config.generation;

    let counter = match &keys.anthropic_api_key {
        Some(key) => Some(AnthropicTokenCounter::new(key.as_str(), settings.token_count_model.as_str())?),
        None => {
            warn!("ANTHROPIC_API_KEY not set; token counts are character estimates");
            None
        }
    };

    if let (true, Some(endpoint), Some(key)) =
        (keys.uses_azure(), &keys.azure_endpoint, &keys.azure_api_key)
    {
        let mut backend = OpenAiBackend::azure(endpoint, key, &settings.model, keys.azure_api_version.as_deref())
            .with_timeout(settings.request_timeout);
        if let Some(counter) = counter {
            backend = backend.with_token_counter(counter);
        }
        return Ok(Box::new(backend));
    }

    let key = keys.openai_api_key.as_deref().ok_or_else(|| {
        PipelineError::Config("Set OPENAI_API_KEY or AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_API_KEY".into())
    })?;
    let mut backend = OpenAiBackend::openai(key, &settings.model).with_timeout(settings.request_timeout);
    if let Some(counter) = counter {
        backend = backend.with_token_counter(counter);
    }
    Ok(Box::new(backend))
}
