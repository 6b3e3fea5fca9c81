use std::time::Duration;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::TokenCounter;
use crate::error::{PipelineError, Result};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const COUNT_TIMEOUT_SECS: u64 = 30;

/// Token counter backed by the Anthropic `count_tokens` endpoint
#[derive(Clone)]
pub struct AnthropicTokenCounter {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicTokenCounter {
    /// Creates a counter for `model`
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(COUNT_TIMEOUT_SECS))
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: ANTHROPIC_API_BASE.to_string(),
        })
    }

    /// Points the counter at a different API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl TokenCounter for AnthropicTokenCounter {
    async fn count_tokens(&self, text: &str) -> Result<usize> {
        let response = self
            .client
            .post(format!("{}/v1/messages/count_tokens", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": text }]
            }))
            .send()
            .await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(PipelineError::RateLimited("Token counting is throttled".into()))
            }
            status if !status.is_success() => {
                return Err(PipelineError::Backend(format!("Token counting failed: HTTP {}", status)))
            }
            _ => {}
        }

        let body: Value = response.json().await?;
        let count = body["input_tokens"]
            .as_u64()
            .ok_or_else(|| PipelineError::Backend("Missing input_tokens in count response".into()))?;
        debug!("Counted {} tokens with {}", count, self.model);
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_count_tokens() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages/count_tokens")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"input_tokens": 42}"#)
            .create_async()
            .await;

        let counter = AnthropicTokenCounter::new("key", "claude-3-5-sonnet-latest")
            .unwrap()
            .with_base_url(server.url());
        assert_eq!(counter.count_tokens("hello").await.unwrap(), 42);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_count_tokens_rate_limited() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages/count_tokens")
            .with_status(429)
            .create_async()
            .await;

        let counter = AnthropicTokenCounter::new("key", "model").unwrap().with_base_url(server.url());
        assert!(matches!(
            counter.count_tokens("hello").await,
            Err(PipelineError::RateLimited(_))
        ));
    }
}
