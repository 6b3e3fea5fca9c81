//! Generation backend collaborator
//!
//! A backend takes an instruction plus a file holding the bounded content and
//! returns text. It also estimates token counts so the budgeter can refuse
//! oversized requests before they are sent.

pub mod anthropic;
pub mod openai;

use std::path::Path;
use async_trait::async_trait;

use crate::error::Result;

pub use anthropic::AnthropicTokenCounter;
pub use openai::OpenAiBackend;

/// Model-specific token estimation
#[async_trait]
pub trait TokenCounter: Send + Sync {
    /// Approximate number of tokens in `text`
    async fn count_tokens(&self, text: &str) -> Result<usize>;
}

/// "Submit prompt + attachment, get text back"
///
/// Implementations must report throttling as `PipelineError::RateLimited`
/// so callers can keep it apart from ordinary failures.
#[async_trait]
pub trait GenerationBackend: TokenCounter {
    /// Sends `instruction` as the system prompt and the file at `content` as the user turn
    async fn submit(&self, content: &Path, instruction: &str) -> Result<String>;
}

/// Rough estimator of about four characters per token
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl HeuristicCounter {
    /// Synchronous estimate
    pub fn estimate(text: &str) -> usize {
        (text.chars().count() + 3) / 4
    }
}

#[async_trait]
impl TokenCounter for HeuristicCounter {
    async fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(Self::estimate(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_estimate() {
        assert_eq!(HeuristicCounter::estimate(""), 0);
        assert_eq!(HeuristicCounter::estimate("abcd"), 1);
        assert_eq!(HeuristicCounter::estimate("abcde"), 2);
        assert_eq!(HeuristicCounter::estimate("ééééé"), 2);
    }
}
