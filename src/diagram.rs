//! Three-stage architecture diagram generation
//!
//! 1. file tree + README → `<explanation>`
//! 2. explanation + file tree → `<component_mapping>`
//! 3. explanation + mapping → Mermaid source
//!
//! Click events in the Mermaid output point at repository paths and are
//! rewritten to full GitHub URLs on the snapshot's default branch.

use std::borrow::Cow;
use log::info;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{PipelineError, Result};
use crate::generator::{extract_tagged, GenerationUnit, OutputFormat, SegmentGenerator};
use crate::prompts;
use crate::snapshot::RepositorySnapshot;

static CLICK_EVENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"click ([^\s"]+)\s+"([^"]+)""#).expect("click event pattern is valid"));

/// A generated diagram and the explanation it was drawn from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagram {
    /// Mermaid source with absolute click-through links
    pub diagram: String,
    /// Architecture explanation from the first stage
    pub explanation: String,
}

/// Runs the explanation, mapping and Mermaid stages
#[derive(Clone)]
pub struct DiagramGenerator {
    generator: SegmentGenerator,
    max_chars: usize,
    max_tokens: Option<usize>,
}

impl DiagramGenerator {
    /// Generator applying `max_chars` and `max_tokens` to every stage
    pub fn new(generator: SegmentGenerator, max_chars: usize, max_tokens: Option<usize>) -> Self {
        Self {
            generator,
            max_chars,
            max_tokens,
        }
    }

    /// Produces a diagram of `snapshot`, honoring optional user instructions
    pub async fn generate(&self, snapshot: &RepositorySnapshot, instructions: Option<&str>) -> Result<Diagram> {
        let file_tree = snapshot.file_tree_text();

        info!("Diagram stage 1/3: explanation of {}/{}", snapshot.owner, snapshot.repo);
        let explanation = self
            .stage(
                format!(
                    "<file_tree>\n{}\n</file_tree>\n<readme>\n{}\n</readme>",
                    file_tree, snapshot.readme
                ),
                prompts::DIAGRAM_EXPLANATION,
                "explanation",
                instructions,
            )
            .await?;

        info!("Diagram stage 2/3: component mapping");
        let mapping = self
            .stage(
                format!(
                    "<explanation>\n{}\n</explanation>\n<file_tree>\n{}\n</file_tree>",
                    explanation, file_tree
                ),
                prompts::DIAGRAM_COMPONENT_MAPPING,
                "component_mapping",
                instructions,
            )
            .await?;

        info!("Diagram stage 3/3: Mermaid");
        let unit = self.unit(
            format!(
                "<explanation>\n{}\n</explanation>\n<component_mapping>\n{}\n</component_mapping>",
                explanation, mapping
            ),
            prompts::DIAGRAM_MERMAID,
            OutputFormat::Mermaid,
            instructions,
        );
        let mermaid = self.generator.generate(&unit).await?;

        Ok(Diagram {
            diagram: rewrite_click_events(&mermaid, &snapshot.owner, &snapshot.repo, &snapshot.default_branch)
                .into_owned(),
            explanation,
        })
    }

    async fn stage(&self, content: String, instruction: &str, tag: &str, instructions: Option<&str>) -> Result<String> {
        let unit = self.unit(content, instruction, OutputFormat::Tagged(tag.to_string()), instructions);
        let reply = self.generator.generate(&unit).await?;
        extract_tagged(&reply, tag)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Backend(format!("Reply has no <{}> section", tag)))
    }

    fn unit(&self, content: String, instruction: &str, format: OutputFormat, instructions: Option<&str>) -> GenerationUnit {
        let (content, instruction) = match instructions.map(str::trim).filter(|i| !i.is_empty()) {
            Some(extra) => (
                format!("{}\n<instructions>\n{}\n</instructions>", content, extra),
                format!("{}\n{}", instruction, prompts::CUSTOM_INSTRUCTIONS),
            ),
            None => (content, instruction.to_string()),
        };
        GenerationUnit::new(content, instruction, format).with_limits(self.max_chars, self.max_tokens)
    }
}

/// Turns `click Node "path"` into `click Node "https://github.com/…"`
///
/// Paths whose last segment has an extension link to `blob`, others to `tree`.
pub fn rewrite_click_events<'a>(diagram: &'a str, owner: &str, repo: &str, branch: &str) -> Cow<'a, str> {
    CLICK_EVENT.replace_all(diagram, |caps: &Captures| {
        let path = caps[2].trim_matches(|c: char| c == '"' || c == '\'');
        let is_file = path.rsplit('/').next().map_or(false, |last| last.contains('.'));
        let kind = if is_file { "blob" } else { "tree" };
        format!(
            "click {} \"https://github.com/{}/{}/{}/{}/{}\"",
            &caps[1], owner, repo, kind, branch, path
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GenerationBackend, HeuristicCounter, TokenCounter};
    use crate::generator::BAD_INSTRUCTIONS;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Answers each stage by looking at its instruction
    struct StageBackend {
        refuse: bool,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TokenCounter for StageBackend {
        async fn count_tokens(&self, text: &str) -> Result<usize> {
            HeuristicCounter.count_tokens(text).await
        }
    }

    #[async_trait]
    impl GenerationBackend for StageBackend {
        async fn submit(&self, content: &Path, instruction: &str) -> Result<String> {
            self.seen.lock().unwrap().push(std::fs::read_to_string(content)?);
            if self.refuse {
                return Ok(BAD_INSTRUCTIONS.into());
            }
            let reply = if instruction.starts_with(prompts::DIAGRAM_EXPLANATION) {
                "<explanation>A CLI talks to a core library.</explanation>"
            } else if instruction.starts_with(prompts::DIAGRAM_COMPONENT_MAPPING) {
                "<component_mapping>\n1. CLI: src/main.rs\n2. Core: src\n</component_mapping>"
            } else {
                "flowchart TD\n    CLI --> Core\n    click CLI \"src/main.rs\"\n    click Core \"src\""
            };
            Ok(reply.into())
        }
    }

    fn snapshot() -> RepositorySnapshot {
        RepositorySnapshot {
            owner: "octocat".into(),
            repo: "demo".into(),
            default_branch: "main".into(),
            file_tree: vec!["src/main.rs".into(), "src/lib.rs".into()],
            readme: "# Demo".into(),
            file_content: String::new(),
            curated_files: Vec::new(),
        }
    }

    fn diagrams(backend: Arc<StageBackend>) -> DiagramGenerator {
        let generator = SegmentGenerator::new(backend).with_retry_pause(Duration::from_millis(1));
        DiagramGenerator::new(generator, 250_000, None)
    }

    #[test]
    fn test_rewrite_click_events() {
        let diagram = "A --> B\nclick A \"src/main.rs\"\nclick B \"docs/\"\nclick C 'x'";
        assert_eq!(
            rewrite_click_events(diagram, "octocat", "demo", "dev"),
            "A --> B\n\
             click A \"https://github.com/octocat/demo/blob/dev/src/main.rs\"\n\
             click B \"https://github.com/octocat/demo/tree/dev/docs/\"\n\
             click C 'x'"
        );
    }

    #[tokio::test]
    async fn test_three_stages_feed_each_other() {
        let backend = Arc::new(StageBackend { refuse: false, seen: Mutex::new(Vec::new()) });
        let diagram = diagrams(backend.clone()).generate(&snapshot(), Some("focus on the CLI")).await.unwrap();

        assert_eq!(diagram.explanation, "A CLI talks to a core library.");
        assert!(diagram
            .diagram
            .contains("click CLI \"https://github.com/octocat/demo/blob/main/src/main.rs\""));
        assert!(diagram.diagram.contains("click Core \"https://github.com/octocat/demo/tree/main/src\""));

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].contains("<readme>\n# Demo\n</readme>"));
        assert!(seen[1].contains("A CLI talks to a core library."));
        assert!(seen[2].contains("1. CLI: src/main.rs"));
        assert!(seen.iter().all(|s| s.contains("<instructions>\nfocus on the CLI\n</instructions>")));
    }

    #[tokio::test]
    async fn test_refused_instructions_are_a_validation_error() {
        let backend = Arc::new(StageBackend { refuse: true, seen: Mutex::new(Vec::new()) });
        let result = diagrams(backend.clone()).generate(&snapshot(), Some("write a poem")).await;
        assert!(matches!(result, Err(PipelineError::Validation(_))));
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
    }
}
