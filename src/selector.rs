//! Picking the handful of files worth reading in full

use std::collections::HashSet;
use async_trait::async_trait;
use log::{debug, warn};

use crate::generator::{GenerationUnit, OutputFormat, SegmentGenerator};
use crate::prompts;

/// Chooses which files of a tree get their contents fetched
#[async_trait]
pub trait FileSelector: Send + Sync {
    /// At most `limit` paths from `file_tree`, most important first
    async fn select(&self, file_tree: &[String], limit: usize) -> Vec<String>;
}

const ENTRY_POINT_STEMS: &[&str] = &["main", "app", "index", "lib", "server", "cli", "__main__", "manage"];

const MANIFESTS: &[&str] = &[
    "cargo.toml",
    "package.json",
    "pyproject.toml",
    "setup.py",
    "requirements.txt",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "gemfile",
    "dockerfile",
    "docker-compose.yml",
    "makefile",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "kt", "rb", "c", "cc", "cpp", "h", "cs", "swift",
];

/// Ranks paths by name: entry points, then manifests, then shallow sources and docs
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicSelector;

impl HeuristicSelector {
    fn score(path: &str) -> Option<(u8, usize)> {
        let lower = path.to_lowercase();
        let depth = lower.matches('/').count();
        let name = lower.rsplit('/').next().unwrap_or(&lower);
        let (stem, extension) = match name.rsplit_once('.') {
            Some((stem, ext)) => (stem, ext),
            None => (name, ""),
        };

        if stem == "readme" {
            return None;
        }
        let is_source = SOURCE_EXTENSIONS.contains(&extension);

        let score = if is_source && ENTRY_POINT_STEMS.contains(&stem) {
            4
        } else if MANIFESTS.contains(&name) && depth <= 1 {
            3
        } else if is_source && depth <= 2 {
            2
        } else if extension == "md" && depth == 0 {
            1
        } else {
            return None;
        };
        Some((score, depth))
    }
}

#[async_trait]
impl FileSelector for HeuristicSelector {
    async fn select(&self, file_tree: &[String], limit: usize) -> Vec<String> {
        let mut ranked: Vec<(u8, usize, usize, &String)> = file_tree
            .iter()
            .enumerate()
            .filter_map(|(order, path)| Self::score(path).map(|(score, depth)| (score, depth, order, path)))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
        ranked.into_iter().take(limit).map(|(_, _, _, path)| path.clone()).collect()
    }
}

/// Asks the generation backend which files matter
///
/// Only paths that exist in the tree are kept. Any failure, or an answer
/// with no usable path, falls back to [`HeuristicSelector`].
#[derive(Clone)]
pub struct BackendSelector {
    generator: SegmentGenerator,
    max_chars: usize,
    max_tokens: Option<usize>,
    fallback: HeuristicSelector,
}

impl BackendSelector {
    /// Selector backed by `generator`, submitting at most `max_chars` of tree
    /// and refusing trees over `max_tokens`
    pub fn new(generator: SegmentGenerator, max_chars: usize, max_tokens: Option<usize>) -> Self {
        Self {
            generator,
            max_chars,
            max_tokens,
            fallback: HeuristicSelector,
        }
    }
}

#[async_trait]
impl FileSelector for BackendSelector {
    async fn select(&self, file_tree: &[String], limit: usize) -> Vec<String> {
        let unit = GenerationUnit::new(file_tree.join("\n"), prompts::FILE_SELECTION, OutputFormat::Markdown)
            .with_limits(self.max_chars, self.max_tokens);
        let answer = match self.generator.generate(&unit).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("File selection by model failed, using heuristics: {}", e);
                return self.fallback.select(file_tree, limit).await;
            }
        };

        let picked = parse_selection(&answer, file_tree, limit);
        if picked.is_empty() {
            warn!("Model named no files from the tree, using heuristics");
            return self.fallback.select(file_tree, limit).await;
        }
        debug!("Model selected {} files", picked.len());
        picked
    }
}

/// Extracts tree paths from a free-form list answer, preserving its order
fn parse_selection(answer: &str, file_tree: &[String], limit: usize) -> Vec<String> {
    let known: HashSet<&str> = file_tree.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();

    answer
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '-' | '*' | '.' | ')' | ' '))
                .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | ','))
                .trim_start_matches('/')
                .trim()
        })
        .filter(|path| known.contains(path))
        .filter(|path| seen.insert(path.to_string()))
        .take(limit)
        .map(str::to_string)
        .collect()
}
