//! Repository host collaborator
//!
//! [`RepositorySource`] is the seam the snapshot builder talks to;
//! [`GitHubClient`] implements it over the GitHub REST API. Every failure is
//! reported as one of `UpstreamNotFound`, `UpstreamAccessDenied` or
//! `UpstreamTransient`.

pub mod filter;

use std::sync::Arc;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, warn};
use reqwest::{header, Client, Response, StatusCode};
use serde_json::Value;
use url::Url;

use crate::config::GitHubSettings;
use crate::error::{PipelineError, Result};
use crate::utils::with_retry;

pub use filter::{filter_tree, should_include_path};

/// Branches tried when the default branch has no tree
const FALLBACK_BRANCHES: &[&str] = &["main", "master"];

/// Read access to one repository host
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Name of the repository's default branch
    async fn default_branch(&self, owner: &str, repo: &str) -> Result<String>;

    /// Filtered, ordered list of file paths on `branch`
    async fn file_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<String>>;

    /// README text
    async fn readme(&self, owner: &str, repo: &str) -> Result<String>;

    /// Contents of a single file
    async fn file_content(&self, owner: &str, repo: &str, path: &str) -> Result<String>;
}

/// Hands out a [`RepositorySource`] bound to a caller's credential
pub trait SourceProvider: Send + Sync {
    /// Source that authenticates with `credential`, or the default one
    fn source_for(&self, credential: Option<&str>) -> Arc<dyn RepositorySource>;
}

/// GitHub REST API client
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    settings: GitHubSettings,
    token: Option<String>,
}

impl GitHubClient {
    /// Creates a client; `token` is used for every request when present
    pub fn new(settings: GitHubSettings, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("repocast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build GitHub client: {}", e)))?;

        if token.is_none() {
            warn!("No GitHub credentials provided. Unauthenticated requests are limited to 60 per hour.");
        }

        Ok(Self { client, settings, token })
    }

    /// Same connection pool, different credential
    pub fn with_token(&self, token: Option<String>) -> Self {
        Self {
            client: self.client.clone(),
            settings: self.settings.clone(),
            token,
        }
    }

    /// API URL for `segments`, each percent-encoded; slashes inside a segment
    /// split it further so branch names and file paths keep their hierarchy
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.settings.api_base).map_err(|e| {
            PipelineError::Config(format!("Invalid GitHub API base {}: {}", self.settings.api_base, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| PipelineError::Config(format!("GitHub API base cannot hold a path: {}", self.settings.api_base)))?
            .pop_if_empty()
            .extend(segments.iter().flat_map(|s| s.split('/')).filter(|s| !s.is_empty()));
        Ok(url)
    }

    async fn get_json(&self, url: Url, subject: &str) -> Result<Value> {
        with_retry(
            || async {
                debug!("GET {}", url);
                let mut request = self
                    .client
                    .get(url.clone())
                    .header(header::ACCEPT, "application/vnd.github+json")
                    .header("X-GitHub-Api-Version", "2022-11-28");
                if let Some(token) = &self.token {
                    request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
                }

                let response = request
                    .send()
                    .await
                    .map_err(|e| PipelineError::UpstreamTransient(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(classify_response(&response, subject));
                }
                response
                    .json::<Value>()
                    .await
                    .map_err(|e| PipelineError::UpstreamTransient(format!("Malformed response: {}", e)))
            },
            self.settings.retries,
            self.settings.retry_delay,
        )
        .await
    }

    async fn tree_for(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<String>> {
        let mut url = self.endpoint(&["repos", owner, repo, "git", "trees", branch])?;
        url.set_query(Some("recursive=1"));
        let data = self.get_json(url, &format!("{}/{}", owner, repo)).await?;

        let tree = data["tree"].as_array().ok_or_else(|| {
            PipelineError::UpstreamNotFound(format!("Repository {}/{} has no tree on {}", owner, repo, branch))
        })?;
        if data["truncated"].as_bool().unwrap_or(false) {
            warn!("Tree for {}/{} was truncated by GitHub", owner, repo);
        }
        Ok(filter_tree(tree.iter().filter_map(|item| item["path"].as_str())))
    }

    async fn decoded_contents(&self, url: Url, subject: &str) -> Result<String> {
        let data = self.get_json(url, subject).await?;
        let encoded = data["content"].as_str().ok_or_else(|| {
            PipelineError::UpstreamNotFound(format!("{} is not a file", subject))
        })?;
        decode_contents(encoded)
    }
}

#[async_trait]
impl RepositorySource for GitHubClient {
    async fn default_branch(&self, owner: &str, repo: &str) -> Result<String> {
        let data = self
            .get_json(self.endpoint(&["repos", owner, repo])?, &format!("{}/{}", owner, repo))
            .await?;
        Ok(data["default_branch"].as_str().unwrap_or("main").to_string())
    }

    async fn file_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<String>> {
        match self.tree_for(owner, repo, branch).await {
            Err(PipelineError::UpstreamNotFound(_)) => {}
            other => return other,
        }

        for fallback in FALLBACK_BRANCHES.iter().filter(|b| **b != branch) {
            debug!("No tree on {}, trying {}", branch, fallback);
            match self.tree_for(owner, repo, fallback).await {
                Err(PipelineError::UpstreamNotFound(_)) => continue,
                other => return other,
            }
        }

        Err(PipelineError::UpstreamNotFound(format!(
            "Repository {}/{} not found, is empty, or is private and requires authentication",
            owner, repo
        )))
    }

    async fn readme(&self, owner: &str, repo: &str) -> Result<String> {
        self.decoded_contents(
            self.endpoint(&["repos", owner, repo, "readme"])?,
            &format!("README of {}/{}", owner, repo),
        )
        .await
    }

    async fn file_content(&self, owner: &str, repo: &str, path: &str) -> Result<String> {
        self.decoded_contents(
            self.endpoint(&["repos", owner, repo, "contents", path])?,
            &format!("File {} in {}/{}", path, owner, repo),
        )
        .await
    }
}

impl SourceProvider for GitHubClient {
    fn source_for(&self, credential: Option<&str>) -> Arc<dyn RepositorySource> {
        match credential {
            Some(token) => Arc::new(self.with_token(Some(token.to_string()))),
            None => Arc::new(self.clone()),
        }
    }
}

/// Maps a non-success response onto the upstream taxonomy
fn classify_response(response: &Response, subject: &str) -> PipelineError {
    let exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.trim() == "0");
    classify_status(response.status(), exhausted, subject)
}

fn classify_status(status: StatusCode, rate_limit_exhausted: bool, subject: &str) -> PipelineError {
    match status {
        StatusCode::NOT_FOUND => {
            PipelineError::UpstreamNotFound(format!("{} not found or is private", subject))
        }
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED if rate_limit_exhausted => {
            PipelineError::UpstreamTransient(format!("GitHub rate limit exhausted while reading {}", subject))
        }
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => PipelineError::UpstreamAccessDenied(format!(
            "Access denied to {}. Repository may be private and require authentication",
            subject
        )),
        status => PipelineError::UpstreamTransient(format!("Failed to read {}: HTTP {}", subject, status)),
    }
}

/// Decodes the base64 payload of the contents API, which wraps lines at 60 chars
fn decode_contents(encoded: &str) -> Result<String> {
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(cleaned)
        .map_err(|e| PipelineError::UpstreamTransient(format!("Invalid base64 content: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, false, "octocat/x"),
            PipelineError::UpstreamNotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, false, "octocat/x"),
            PipelineError::UpstreamAccessDenied(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, true, "octocat/x"),
            PipelineError::UpstreamTransient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, false, "octocat/x"),
            PipelineError::UpstreamTransient(_)
        ));
    }

    #[test]
    fn test_endpoint_encodes_each_segment() {
        let client = GitHubClient::new(GitHubSettings::default(), Some("ghp_test".into())).unwrap();
        let url = client
            .endpoint(&["repos", "octocat", "demo", "contents", "/docs/C# notes?.md"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octocat/demo/contents/docs/C%23%20notes%3F.md"
        );

        let url = client.endpoint(&["repos", "octocat", "demo", "git", "trees", "release/1.0"]).unwrap();
        assert_eq!(url.path(), "/repos/octocat/demo/git/trees/release/1.0");
    }

    #[test]
    fn test_decode_wrapped_base64() {
        // "Hello World\n" split the way the contents API wraps it
        let decoded = decode_contents("SGVsbG8g\nV29ybGQK\n").unwrap();
        assert_eq!(decoded, "Hello World\n");
    }
}
