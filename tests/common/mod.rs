#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use repocast::backend::{GenerationBackend, HeuristicCounter, TokenCounter};
use repocast::config::Config;
use repocast::error::{PipelineError, Result};
use repocast::github::{RepositorySource, SourceProvider};

pub mod test_helpers {
    use super::*;

    pub fn setup_test_logger() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }

    /// Defaults with a pause short enough for tests
    pub fn create_test_config() -> Config {
        let mut config = Config::default();
        config.generation.retry_pause = Duration::from_millis(1);
        config.github.retry_delay = Duration::from_millis(1);
        config
    }

    pub fn speak(inner: &str) -> String {
        format!("<speak version=\"1.0\" xml:lang=\"en-US\"><voice name=\"en-US-AvaMultilingualNeural\">{}</voice></speak>", inner)
    }
}

/// In-memory repository host that counts every fetch
pub struct MockRepository {
    pub default_branch: String,
    pub tree: Vec<String>,
    pub readme: Option<String>,
    pub files: HashMap<String, String>,
    pub missing: bool,
    pub delay: Duration,
    pub branch_fetches: AtomicUsize,
    pub file_fetches: AtomicUsize,
}

impl MockRepository {
    /// The classic octocat/Hello-World: one README, nothing else
    pub fn hello_world() -> Self {
        Self {
            default_branch: "master".into(),
            tree: vec!["README".into()],
            readme: Some("Hello World!".into()),
            files: HashMap::new(),
            missing: false,
            delay: Duration::ZERO,
            branch_fetches: AtomicUsize::new(0),
            file_fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_files(mut self, files: &[(&str, &str)]) -> Self {
        for (path, content) in files {
            self.tree.push(path.to_string());
            self.files.insert(path.to_string(), content.to_string());
        }
        self
    }

    pub fn with_readme(mut self, readme: &str) -> Self {
        self.readme = Some(readme.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::hello_world()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.branch_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositorySource for MockRepository {
    async fn default_branch(&self, owner: &str, repo: &str) -> Result<String> {
        self.branch_fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.missing {
            return Err(PipelineError::UpstreamNotFound(format!("{}/{} not found or is private", owner, repo)));
        }
        Ok(self.default_branch.clone())
    }

    async fn file_tree(&self, _owner: &str, _repo: &str, _branch: &str) -> Result<Vec<String>> {
        Ok(self.tree.clone())
    }

    async fn readme(&self, owner: &str, repo: &str) -> Result<String> {
        self.readme
            .clone()
            .ok_or_else(|| PipelineError::UpstreamNotFound(format!("README of {}/{}", owner, repo)))
    }

    async fn file_content(&self, _owner: &str, _repo: &str, path: &str) -> Result<String> {
        self.file_fetches.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::UpstreamNotFound(path.to_string()))
    }
}

/// Hands the same mock out for every credential
pub struct MockProvider(pub Arc<MockRepository>);

impl SourceProvider for MockProvider {
    fn source_for(&self, _credential: Option<&str>) -> Arc<dyn RepositorySource> {
        self.0.clone()
    }
}

/// What the scripted backend does for one instruction
#[derive(Clone)]
pub enum Reply {
    Text(String),
    Delayed(Duration, String),
    RateLimited,
}

/// Backend answering by instruction, recording every submission
pub struct ScriptedBackend {
    replies: Vec<(&'static str, Reply)>,
    pub submissions: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<(&'static str, Reply)>) -> Arc<Self> {
        Arc::new(Self {
            replies,
            submissions: Mutex::new(Vec::new()),
        })
    }

    /// Contents submitted with `instruction`
    pub fn contents_for(&self, instruction: &str) -> Vec<String> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| i == instruction)
            .map(|(_, content)| content.clone())
            .collect()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl TokenCounter for ScriptedBackend {
    async fn count_tokens(&self, text: &str) -> Result<usize> {
        HeuristicCounter.count_tokens(text).await
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn submit(&self, content: &Path, instruction: &str) -> Result<String> {
        let content = tokio::fs::read_to_string(content).await?;
        self.submissions
            .lock()
            .unwrap()
            .push((instruction.to_string(), content));

        let reply = self
            .replies
            .iter()
            .find(|(prefix, _)| instruction.starts_with(prefix))
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| PipelineError::Backend(format!("No scripted reply for {:.40}", instruction)))?;

        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Reply::RateLimited => Err(PipelineError::RateLimited("Rate limit reached for gpt-4o".into())),
        }
    }
}
