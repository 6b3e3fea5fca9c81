//! Segment generation with retry-until-valid
//!
//! One [`GenerationUnit`] becomes one backend request. The reply is cleaned
//! up and checked against the unit's [`OutputFormat`]; invalid replies are
//! retried after a fixed pause until the attempt budget runs out. Throttling
//! and transport failures are never retried here.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, info, warn};

use crate::backend::GenerationBackend;
use crate::budget::budget;
use crate::config::GenerationSettings;
use crate::error::{PipelineError, Result};
use crate::stitcher::{is_single_root_document, normalize_fragment, WRAPPER_TAG};

/// Reply a model gives when the user's instructions make no sense
pub const BAD_INSTRUCTIONS: &str = "BAD_INSTRUCTIONS";

/// Expected shape of a model reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// One well-formed SSML document rooted at `<speak>`
    Ssml,
    /// Any non-blank Markdown
    Markdown,
    /// Non-blank Mermaid source
    Mermaid,
    /// Free text holding a `<tag>…</tag>` section
    Tagged(String),
}

impl OutputFormat {
    /// Whether `text` is acceptable output for this format
    pub fn is_valid(&self, text: &str) -> bool {
        match self {
            Self::Ssml => is_single_root_document(text, WRAPPER_TAG),
            Self::Markdown => !text.trim().is_empty(),
            Self::Mermaid => {
                let trimmed = text.trim();
                !trimmed.is_empty() && trimmed != BAD_INSTRUCTIONS
            }
            Self::Tagged(tag) => extract_tagged(text, tag).is_some(),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssml => write!(f, "SSML"),
            Self::Markdown => write!(f, "Markdown"),
            Self::Mermaid => write!(f, "Mermaid"),
            Self::Tagged(tag) => write!(f, "<{}>", tag),
        }
    }
}

/// Returns the text between the first `<tag>` and the following `</tag>`
pub fn extract_tagged<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim())
}

/// One request to the generation backend
#[derive(Debug, Clone)]
pub struct GenerationUnit {
    /// Text handed to the backend as an attachment
    pub content: String,
    /// System instruction
    pub instruction: String,
    /// Character ceiling applied before counting tokens
    pub max_chars: usize,
    /// Token ceiling, if the request must be size checked
    pub max_tokens: Option<usize>,
    /// Validity predicate for the reply
    pub format: OutputFormat,
}

impl GenerationUnit {
    /// Unit with no size limits
    pub fn new(content: impl Into<String>, instruction: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            content: content.into(),
            instruction: instruction.into(),
            max_chars: usize::MAX,
            max_tokens: None,
            format,
        }
    }

    /// Sets the character and token ceilings
    pub fn with_limits(mut self, max_chars: usize, max_tokens: Option<usize>) -> Self {
        self.max_chars = max_chars;
        self.max_tokens = max_tokens;
        self
    }
}

/// Turns generation units into validated text
#[derive(Clone)]
pub struct SegmentGenerator {
    backend: Arc<dyn GenerationBackend>,
    max_attempts: u32,
    retry_pause: Duration,
}

impl SegmentGenerator {
    /// Generator with 3 attempts and a 2 second pause
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            max_attempts: 3,
            retry_pause: Duration::from_secs(2),
        }
    }

    /// Generator using the configured attempt budget and pause
    pub fn from_settings(backend: Arc<dyn GenerationBackend>, settings: &GenerationSettings) -> Self {
        Self::new(backend)
            .with_max_attempts(settings.max_attempts)
            .with_retry_pause(settings.retry_pause)
    }

    /// Overrides the attempt budget (at least one)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Overrides the pause between invalid attempts
    pub fn with_retry_pause(mut self, retry_pause: Duration) -> Self {
        self.retry_pause = retry_pause;
        self
    }

    /// Backend this generator submits to
    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.backend
    }

    /// Budgets, submits and validates `unit`, retrying invalid replies
    pub async fn generate(&self, unit: &GenerationUnit) -> Result<String> {
        let bounded = budget(&unit.content, unit.max_chars, unit.max_tokens, self.backend.as_ref()).await?;
        if bounded.truncated {
            info!("{} request content cut to {} characters", unit.format, unit.max_chars);
        }
        if bounded.is_degraded() {
            warn!("Submitting {} output request without a token size check", unit.format);
        }

        // Removed on drop, whichever way this function returns
        let mut attachment = tempfile::Builder::new()
            .prefix("repocast-")
            .suffix(".txt")
            .tempfile()?;
        attachment.write_all(bounded.content.as_bytes())?;
        attachment.flush()?;

        for attempt in 1..=self.max_attempts {
            debug!("{} generation attempt {}/{}", unit.format, attempt, self.max_attempts);
            let reply = self.backend.submit(attachment.path(), &unit.instruction).await?;
            let cleaned = normalize_fragment(&reply);

            if cleaned == BAD_INSTRUCTIONS {
                return Err(PipelineError::Validation(
                    "Invalid or unclear instructions provided".into(),
                ));
            }
            if unit.format.is_valid(&cleaned) {
                info!("Generated valid {} output on attempt {}", unit.format, attempt);
                return Ok(cleaned);
            }

            warn!("Invalid {} output on attempt {}/{}", unit.format, attempt, self.max_attempts);
            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_pause).await;
            }
        }

        Err(PipelineError::GenerationExhausted {
            format: unit.format.to_string(),
            attempts: self.max_attempts,
        })
    }
}
