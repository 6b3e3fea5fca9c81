#![warn(missing_docs)]
#![warn(clippy::all)]

//! repocast - turns a source repository into diagrams, slide decks and narrated podcasts
//!
//! Repository metadata and a few curated files are fetched once per
//! repository and credential, cached, and fed to a language model through a
//! sequence of prompts. Long narrations are split into two segments that are
//! generated concurrently and stitched back into one SSML document.
//!
//! ## Usage
//! ```rust,ignore
//! use repocast::{ArtifactRequest, ArtifactService, Config, NarrationLength};
//!
//! async fn example() -> repocast::Result<()> {
//!     let service = ArtifactService::from_config(Config::load()?)?;
//!     let request = ArtifactRequest::parse("octocat/Hello-World")?;
//!
//!     println!("{}", service.estimate_cost(&request).await?);
//!     let podcast = service.generate_narration(&request, NarrationLength::Long).await?;
//!     println!("{}", podcast.body());
//!     Ok(())
//! }
//! ```

/// Generation backends and token counting
pub mod backend;
/// Content truncation and token ceilings
pub mod budget;
/// Bounded single-flight snapshot cache
pub mod cache;
/// Configuration loaded from TOML and the environment
pub mod config;
/// Three-stage diagram generation
pub mod diagram;
/// Error handling types and utilities
pub mod error;
/// Retry-until-valid segment generation
pub mod generator;
/// Repository host client
pub mod github;
/// Logging configuration and utilities
pub mod logging;
/// Concurrent dual-segment narration
pub mod orchestrator;
/// Bounded task pool
pub mod parallel;
/// Model instructions
pub mod prompts;
/// Curated file selection
pub mod selector;
/// Artifact service tying the pipeline together
pub mod service;
/// Repository snapshots and their builder
pub mod snapshot;
/// SSML wrapper stripping and stitching
pub mod stitcher;
/// Retry helpers
pub mod utils;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use service::{Artifact, ArtifactRequest, ArtifactService, CostEstimate, NarrationLength};
