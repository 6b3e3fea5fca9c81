//! Repository snapshots
//!
//! A snapshot bundles everything the generators read about a repository:
//! default branch, filtered file tree, README and the tagged contents of a
//! few curated files. Snapshots are immutable once built.

use std::sync::Arc;
use futures::future::join_all;
use log::{debug, info, warn};

use crate::budget::truncate_chars;
use crate::error::{PipelineError, Result};
use crate::github::RepositorySource;
use crate::selector::FileSelector;

/// Identifies a snapshot: repository plus who is looking at it
///
/// The credential itself is never stored, only its MD5 fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    /// Repository owner, lowercased
    pub owner: String,
    /// Repository name, lowercased
    pub repo: String,
    /// Hex digest of the credential, if one was supplied
    pub credential_fingerprint: Option<String>,
}

impl SnapshotKey {
    /// Builds a key; GitHub names are case-insensitive so they are normalized
    pub fn new(owner: &str, repo: &str, credential: Option<&str>) -> Self {
        Self {
            owner: owner.to_lowercase(),
            repo: repo.to_lowercase(),
            credential_fingerprint: credential.map(fingerprint),
        }
    }
}

fn fingerprint(credential: &str) -> String {
    format!("{:x}", md5::compute(credential.as_bytes()))
}

/// Cached inputs for every artifact of one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySnapshot {
    /// Owner as requested
    pub owner: String,
    /// Repository name as requested
    pub repo: String,
    /// Default branch, used for click-through links
    pub default_branch: String,
    /// Filtered file paths, in tree order
    pub file_tree: Vec<String>,
    /// README text, empty when the repository has none
    pub readme: String,
    /// Concatenated `FPATH: … CONTENT:…` sections of the curated files
    pub file_content: String,
    /// Paths whose contents made it into `file_content`
    pub curated_files: Vec<String>,
}

impl RepositorySnapshot {
    /// File tree as newline-separated text
    pub fn file_tree_text(&self) -> String {
        self.file_tree.join("\n")
    }
}

/// Formats one curated file section
///
/// Markdown files get no discussion hint.
pub fn tag_curated_file(path: &str, content: &str, ceiling: usize) -> String {
    let hint = if path.to_lowercase().ends_with(".md") {
        ""
    } else {
        "- discuss this file."
    };
    format!("FPATH: {} {} \n CONTENT:{}", path, hint, truncate_chars(content, ceiling))
}

/// Fetches everything a snapshot needs from a [`RepositorySource`]
#[derive(Clone)]
pub struct SnapshotBuilder {
    selector: Arc<dyn FileSelector>,
    max_curated_files: usize,
    file_content_ceiling: usize,
}

impl SnapshotBuilder {
    /// Builder with the default bounds of 10 files and 50,000 characters each
    pub fn new(selector: Arc<dyn FileSelector>) -> Self {
        Self {
            selector,
            max_curated_files: 10,
            file_content_ceiling: 50_000,
        }
    }

    /// Overrides the curated file bounds
    pub fn with_limits(mut self, max_curated_files: usize, file_content_ceiling: usize) -> Self {
        self.max_curated_files = max_curated_files;
        self.file_content_ceiling = file_content_ceiling;
        self
    }

    /// Runs the full upstream fetch sequence for one repository
    pub async fn build(&self, source: &dyn RepositorySource, owner: &str, repo: &str) -> Result<RepositorySnapshot> {
        info!("Building snapshot of {}/{}", owner, repo);

        let default_branch = source.default_branch(owner, repo).await?;
        let file_tree = source.file_tree(owner, repo, &default_branch).await?;

        let readme = match source.readme(owner, repo).await {
            Ok(readme) => readme,
            Err(PipelineError::UpstreamNotFound(_)) => {
                debug!("{}/{} has no README", owner, repo);
                String::new()
            }
            Err(e) => return Err(e),
        };

        let selected = self.selector.select(&file_tree, self.max_curated_files).await;
        let fetches = selected
            .iter()
            .take(self.max_curated_files)
            .map(|path| source.file_content(owner, repo, path));
        let fetched = join_all(fetches).await;

        let mut file_content = String::new();
        let mut curated_files = Vec::new();
        for (path, result) in selected.iter().zip(fetched) {
            match result {
                Ok(content) => {
                    file_content.push_str(&tag_curated_file(path, &content, self.file_content_ceiling));
                    curated_files.push(path.clone());
                }
                Err(e) => warn!("Skipping {} in {}/{}: {}", path, owner, repo, e),
            }
        }

        info!(
            "Snapshot of {}/{}: {} paths, {} curated files",
            owner,
            repo,
            file_tree.len(),
            curated_files.len()
        );

        Ok(RepositorySnapshot {
            owner: owner.to_string(),
            repo: repo.to_string(),
            default_branch,
            file_tree,
            readme,
            file_content,
            curated_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::HeuristicSelector;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct FakeSource {
        has_readme: bool,
    }

    #[async_trait]
    impl RepositorySource for FakeSource {
        async fn default_branch(&self, _owner: &str, _repo: &str) -> Result<String> {
            Ok("trunk".into())
        }

        async fn file_tree(&self, _owner: &str, _repo: &str, branch: &str) -> Result<Vec<String>> {
            assert_eq!(branch, "trunk");
            Ok(vec!["src/main.rs".into(), "src/broken.rs".into(), "NOTES.md".into()])
        }

        async fn readme(&self, owner: &str, repo: &str) -> Result<String> {
            if self.has_readme {
                Ok("# Demo".into())
            } else {
                Err(PipelineError::UpstreamNotFound(format!("README of {}/{}", owner, repo)))
            }
        }

        async fn file_content(&self, _owner: &str, _repo: &str, path: &str) -> Result<String> {
            match path {
                "src/broken.rs" => Err(PipelineError::UpstreamTransient("reset".into())),
                _ => Ok(format!("contents of {}", path)),
            }
        }
    }

    fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new(Arc::new(HeuristicSelector))
    }

    #[test]
    fn test_key_fingerprints_credential() {
        let key = SnapshotKey::new("Octocat", "Hello-World", Some("secret"));
        assert_eq!(key.owner, "octocat");
        assert_eq!(key.repo, "hello-world");
        assert_eq!(
            key.credential_fingerprint.as_deref(),
            Some("5ebe2294ecd0e0f08eab7690d2a6ee69")
        );
        assert_ne!(key, SnapshotKey::new("octocat", "hello-world", None));
    }

    #[test]
    fn test_tag_curated_file() {
        assert_eq!(
            tag_curated_file("src/lib.rs", "fn main() {}", 50_000),
            "FPATH: src/lib.rs - discuss this file. \n CONTENT:fn main() {}"
        );
        assert_eq!(tag_curated_file("docs/a.md", "abcdef", 3), "FPATH: docs/a.md  \n CONTENT:abc");
    }

    #[tokio::test]
    async fn test_build_skips_failed_files() {
        let snapshot = builder()
            .build(&FakeSource { has_readme: true }, "octocat", "demo")
            .await
            .unwrap();

        assert_eq!(snapshot.default_branch, "trunk");
        assert_eq!(snapshot.readme, "# Demo");
        assert_eq!(snapshot.curated_files, vec!["src/main.rs", "NOTES.md"]);
        assert!(snapshot.file_content.contains("FPATH: src/main.rs - discuss this file."));
        assert!(!snapshot.file_content.contains("broken"));
    }

    #[tokio::test]
    async fn test_missing_readme_is_empty() {
        let snapshot = builder()
            .build(&FakeSource { has_readme: false }, "octocat", "demo")
            .await
            .unwrap();
        assert_eq!(snapshot.readme, "");
    }
}
