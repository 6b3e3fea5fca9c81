//! Content budgeting
//!
//! Content is always cut to a character ceiling first. Only then, and only
//! when a token ceiling is requested, is it measured with the backend's
//! estimator. A failing estimator does not fail the request: the result
//! records [`SizeCheck::Degraded`] and a warning is logged so operators can
//! see that size protection was off.

use log::{debug, warn};

use crate::backend::TokenCounter;
use crate::error::{PipelineError, Result};

/// Outcome of the token ceiling check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeCheck {
    /// No token ceiling was requested
    Skipped,
    /// The measured count fits under the ceiling
    Passed(usize),
    /// The estimator failed; the content was not measured
    Degraded(String),
}

/// Content that has been cut to size and, if requested, measured
#[derive(Debug, Clone)]
pub struct Budgeted {
    /// Prefix of the original content, at most `max_chars` characters
    pub content: String,
    /// Whether anything was cut
    pub truncated: bool,
    /// Result of the token ceiling check
    pub size_check: SizeCheck,
}

impl Budgeted {
    /// Whether the token ceiling could not be enforced
    pub fn is_degraded(&self) -> bool {
        matches!(self.size_check, SizeCheck::Degraded(_))
    }
}

/// Returns the longest prefix of `content` holding at most `max_chars` characters
pub fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => &content[..byte_offset],
        None => content,
    }
}

/// Cuts `content` to `max_chars` and enforces `max_tokens` when given
pub async fn budget<C>(
    content: &str,
    max_chars: usize,
    max_tokens: Option<usize>,
    counter: &C,
) -> Result<Budgeted>
where
    C: TokenCounter + ?Sized,
{
    let bounded = truncate_chars(content, max_chars);
    let truncated = bounded.len() < content.len();
    if truncated {
        debug!("Truncated content from {} to {} bytes", content.len(), bounded.len());
    }

    let size_check = match max_tokens {
        None => SizeCheck::Skipped,
        Some(limit) => match counter.count_tokens(bounded).await {
            Ok(measured) if measured > limit => {
                return Err(PipelineError::SizeExceeded { measured, limit });
            }
            Ok(measured) => {
                debug!("Token count {} within limit {}", measured, limit);
                SizeCheck::Passed(measured)
            }
            Err(e) => {
                warn!("Token counting failed, size check disabled for this request: {}", e);
                SizeCheck::Degraded(e.to_string())
            }
        },
    };

    Ok(Budgeted {
        content: bounded.to_string(),
        truncated,
        size_check,
    })
}
