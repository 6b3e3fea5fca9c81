//! Artifact service
//!
//! [`ArtifactService`] owns the snapshot cache and wires snapshots into the
//! generators: one generator call for slides and short narration, the
//! dual-segment orchestrator for long narration, the three-stage pipeline for
//! diagrams. It also estimates what a diagram would cost.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use log::{info, warn};
use url::Url;

use crate::backend::{openai::backend_from_config, GenerationBackend, HeuristicCounter, TokenCounter};
use crate::cache::SnapshotCache;
use crate::config::Config;
use crate::diagram::{Diagram, DiagramGenerator};
use crate::error::{PipelineError, Result};
use crate::generator::{GenerationUnit, OutputFormat, SegmentGenerator};
use crate::github::{GitHubClient, SourceProvider};
use crate::orchestrator::DualSegmentOrchestrator;
use crate::prompts;
use crate::selector::{BackendSelector, FileSelector};
use crate::snapshot::{RepositorySnapshot, SnapshotBuilder, SnapshotKey};

/// Narration length
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum NarrationLength {
    /// One segment over everything
    Short,
    /// STRUCTURAL and DEEP segments generated concurrently
    Long,
}

impl fmt::Display for NarrationLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short => write!(f, "short"),
            Self::Long => write!(f, "long"),
        }
    }
}

impl FromStr for NarrationLength {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "long" => Ok(Self::Long),
            other => Err(PipelineError::Validation(format!("Unknown narration length: {}", other))),
        }
    }
}

/// A generated artifact, owned by the request that asked for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Mermaid diagram with its explanation
    Diagram(Diagram),
    /// Marp slide deck
    Slides {
        /// Markdown source
        markdown: String,
    },
    /// Narrated podcast script
    Narration {
        /// One `<speak>` document
        ssml: String,
        /// Length it was generated for
        length: NarrationLength,
    },
}

impl Artifact {
    /// Main text of the artifact
    pub fn body(&self) -> &str {
        match self {
            Self::Diagram(diagram) => &diagram.diagram,
            Self::Slides { markdown } => markdown,
            Self::Narration { ssml, .. } => ssml,
        }
    }
}

/// Estimated price of generating a diagram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    /// Input tokens including prompt overhead
    pub input_tokens: usize,
    /// Expected output tokens
    pub output_tokens: usize,
    /// Total in US dollars
    pub usd: f64,
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2} USD", self.usd)
    }
}

/// Which repository to read and on whose behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// GitHub token for private repositories
    pub credential: Option<String>,
    /// Free-form user instructions
    pub instructions: Option<String>,
}

impl ArtifactRequest {
    /// Request for `owner/repo` without credential or instructions
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            credential: None,
            instructions: None,
        }
    }

    /// Parses `owner/repo` or a `https://github.com/owner/repo` URL
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let path = if input.contains("://") {
            let url = Url::parse(input).map_err(|e| PipelineError::Validation(format!("Invalid URL {}: {}", input, e)))?;
            if url.host_str() != Some("github.com") && url.host_str() != Some("www.github.com") {
                return Err(PipelineError::Validation(format!("Not a GitHub URL: {}", input)));
            }
            url.path().to_string()
        } else {
            input.to_string()
        };

        let mut segments = path.split('/').filter(|s| !s.is_empty());
        match (segments.next(), segments.next()) {
            (Some(owner), Some(repo)) => Ok(Self::new(owner, repo.trim_end_matches(".git"))),
            _ => Err(PipelineError::Validation(format!(
                "Expected owner/repo or a GitHub repository URL, got {}",
                input
            ))),
        }
    }

    /// Sets the GitHub token used for this request
    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential.filter(|c| !c.trim().is_empty());
        self
    }

    /// Sets user instructions
    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }
}

/// Entry point for every artifact
pub struct ArtifactService {
    config: Config,
    sources: Arc<dyn SourceProvider>,
    generator: SegmentGenerator,
    builder: SnapshotBuilder,
    cache: SnapshotCache,
}

impl ArtifactService {
    /// Service over explicit collaborators; curated files are picked by the backend
    pub fn new(config: Config, sources: Arc<dyn SourceProvider>, backend: Arc<dyn GenerationBackend>) -> Self {
        let generator = SegmentGenerator::from_settings(backend, &config.generation);
        let selector: Arc<dyn FileSelector> = Arc::new(BackendSelector::new(
            generator.clone(),
            config.generation.max_chars,
            Some(config.generation.max_tokens),
        ));
        let builder = SnapshotBuilder::new(selector)
            .with_limits(config.cache.max_curated_files, config.cache.file_content_ceiling);
        let cache = SnapshotCache::new(config.cache.capacity);

        Self {
            config,
            sources,
            generator,
            builder,
            cache,
        }
    }

    /// Service talking to GitHub and the configured model provider
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let github = GitHubClient::new(config.github.clone(), config.api_keys.github_token.clone())?;
        let backend: Arc<dyn GenerationBackend> = Arc::from(backend_from_config(&config)?);
        Ok(Self::new(config, Arc::new(github), backend))
    }

    /// Replaces the curated file selector
    pub fn with_selector(mut self, selector: Arc<dyn FileSelector>) -> Self {
        self.builder = SnapshotBuilder::new(selector)
            .with_limits(self.config.cache.max_curated_files, self.config.cache.file_content_ceiling);
        self
    }

    /// Cached snapshot of the requested repository, built on first use
    pub async fn snapshot(&self, request: &ArtifactRequest) -> Result<Arc<RepositorySnapshot>> {
        let credential = request.credential.as_deref();
        let key = SnapshotKey::new(&request.owner, &request.repo, credential);
        let source = self.sources.source_for(credential);

        let builder = &self.builder;
        let (owner, repo) = (request.owner.as_str(), request.repo.as_str());
        self.cache
            .get_or_build(&key, move || async move { builder.build(source.as_ref(), owner, repo).await })
            .await
    }

    /// Estimated price of a diagram of the requested repository
    pub async fn estimate_cost(&self, request: &ArtifactRequest) -> Result<CostEstimate> {
        let snapshot = self.snapshot(request).await?;
        let tree_tokens = self.count_or_estimate(&snapshot.file_tree_text()).await;
        let readme_tokens = self.count_or_estimate(&snapshot.readme).await;

        let pricing = &self.config.pricing;
        let input_tokens = tree_tokens * 2 + readme_tokens + pricing.prompt_overhead_tokens;
        let output_tokens = pricing.expected_output_tokens;
        let usd = input_tokens as f64 * pricing.input_per_million / 1_000_000.0
            + output_tokens as f64 * pricing.output_per_million / 1_000_000.0;

        Ok(CostEstimate {
            input_tokens,
            output_tokens,
            usd,
        })
    }

    /// Podcast-style narration as one `<speak>` document
    pub async fn generate_narration(&self, request: &ArtifactRequest, length: NarrationLength) -> Result<Artifact> {
        self.check_instructions(request)?;
        let snapshot = self.snapshot(request).await?;
        let tree = snapshot.file_tree_text();
        info!("Generating {} narration of {}/{}", length, request.owner, request.repo);

        let ssml = match length {
            NarrationLength::Short => {
                let content = format!(
                    "FILE TREE: {}\nREADME: {} IMPORTANT FILES: {}",
                    tree, snapshot.readme, snapshot.file_content
                );
                let unit = self.bounded_unit(content, prompts::NARRATION, OutputFormat::Ssml);
                self.generator.generate(&unit).await?
            }
            NarrationLength::Long => {
                let structural = self.bounded_unit(
                    format!("FILE TREE: {}\nREADME: {}", tree, snapshot.readme),
                    prompts::NARRATION_STRUCTURAL,
                    OutputFormat::Ssml,
                );
                let deep = self.bounded_unit(
                    format!("IMPORTANT FILES: {}", snapshot.file_content),
                    prompts::NARRATION_DEEP,
                    OutputFormat::Ssml,
                );
                DualSegmentOrchestrator::new(self.generator.clone())
                    .run(structural, deep)
                    .await?
            }
        };

        Ok(Artifact::Narration { ssml, length })
    }

    /// Marp slide deck
    pub async fn generate_slides(&self, request: &ArtifactRequest) -> Result<Artifact> {
        self.check_instructions(request)?;
        let snapshot = self.snapshot(request).await?;
        info!("Generating slides of {}/{}", request.owner, request.repo);

        let content = format!(" file tree: {} \n contents: {}", snapshot.file_tree_text(), snapshot.file_content);
        let unit = self.bounded_unit(content, prompts::SLIDES, OutputFormat::Markdown);
        let markdown = self.generator.generate(&unit).await?;
        Ok(Artifact::Slides { markdown })
    }

    /// Mermaid architecture diagram
    pub async fn generate_diagram(&self, request: &ArtifactRequest) -> Result<Artifact> {
        self.check_instructions(request)?;
        let snapshot = self.snapshot(request).await?;

        let settings = &self.config.generation;
        let diagram = DiagramGenerator::new(self.generator.clone(), settings.max_chars, Some(settings.max_tokens))
            .generate(&snapshot, request.instructions.as_deref())
            .await?;
        Ok(Artifact::Diagram(diagram))
    }

    fn bounded_unit(&self, content: String, instruction: &str, format: OutputFormat) -> GenerationUnit {
        let settings = &self.config.generation;
        GenerationUnit::new(content, instruction, format).with_limits(settings.max_chars, Some(settings.max_tokens))
    }

    fn check_instructions(&self, request: &ArtifactRequest) -> Result<()> {
        let limit = self.config.generation.max_instruction_chars;
        match &request.instructions {
            Some(instructions) if instructions.chars().count() > limit => Err(PipelineError::Validation(format!(
                "Instructions exceed maximum length of {} characters",
                limit
            ))),
            _ => Ok(()),
        }
    }

    async fn count_or_estimate(&self, text: &str) -> usize {
        match self.generator.backend().count_tokens(text).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Token counting failed, using character estimate: {}", e);
                HeuristicCounter::estimate(text)
            }
        }
    }
}
