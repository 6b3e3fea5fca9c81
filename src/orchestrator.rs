//! Concurrent dual-segment generation for long-form narration
//!
//! The STRUCTURAL segment (file tree and README) and the DEEP segment
//! (curated file contents) are generated as two independent tasks. Both are
//! always awaited. If either fails the whole request fails; otherwise the two
//! are stitched STRUCTURAL first, however the tasks happened to finish.

use std::fmt;
use futures::future::{BoxFuture, FutureExt};
use log::{info, warn};

use crate::error::{PipelineError, Result};
use crate::generator::{GenerationUnit, SegmentGenerator};
use crate::parallel::{BoundedPool, TaskLost};
use crate::stitcher::stitch;

/// Position of a segment in the assembled document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentRole {
    /// File tree and README overview, always first
    Structural,
    /// Walkthrough of curated file contents, always second
    Deep,
}

impl fmt::Display for SegmentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural => write!(f, "STRUCTURAL"),
            Self::Deep => write!(f, "DEEP"),
        }
    }
}

/// Runs the STRUCTURAL and DEEP units concurrently and stitches the results
#[derive(Clone)]
pub struct DualSegmentOrchestrator {
    generator: SegmentGenerator,
    pool: BoundedPool,
}

impl DualSegmentOrchestrator {
    /// Orchestrator over a pool sized to the two segments
    pub fn new(generator: SegmentGenerator) -> Self {
        Self {
            generator,
            pool: BoundedPool::new(2),
        }
    }

    /// Generates both segments and returns one `<speak>` document
    pub async fn run(&self, structural: GenerationUnit, deep: GenerationUnit) -> Result<String> {
        info!("Generating STRUCTURAL and DEEP segments concurrently");

        let tasks: Vec<BoxFuture<'static, Result<String>>> = vec![
            self.segment_task(structural),
            self.segment_task(deep),
        ];
        let mut settled = self.pool.run(tasks).await.into_iter();

        let structural = settle(SegmentRole::Structural, settled.next());
        let deep = settle(SegmentRole::Deep, settled.next());

        let (structural, deep) = select_outcome(structural, deep)?;
        Ok(stitch(&[structural, deep]))
    }

    fn segment_task(&self, unit: GenerationUnit) -> BoxFuture<'static, Result<String>> {
        let generator = self.generator.clone();
        async move { generator.generate(&unit).await }.boxed()
    }
}

fn settle(role: SegmentRole, slot: Option<std::result::Result<Result<String>, TaskLost>>) -> Result<String> {
    match slot {
        Some(Ok(outcome)) => outcome,
        Some(Err(TaskLost(reason))) => Err(PipelineError::PartialSegmentFailure { role, reason }),
        None => Err(PipelineError::PartialSegmentFailure {
            role,
            reason: "task produced no result".into(),
        }),
    }
}

/// Both or nothing; STRUCTURAL's error wins when both segments failed
fn select_outcome(structural: Result<String>, deep: Result<String>) -> Result<(String, String)> {
    match (structural, deep) {
        (Ok(structural), Ok(deep)) => Ok((structural, deep)),
        (Err(error), deep) => {
            if let Err(other) = deep {
                warn!("DEEP segment also failed: {}", other);
            }
            warn!("STRUCTURAL segment failed: {}", error);
            Err(error)
        }
        (Ok(_), Err(error)) => {
            warn!("DEEP segment failed, discarding STRUCTURAL result: {}", error);
            Err(error)
        }
    }
}
