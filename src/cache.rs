//! Bounded single-flight snapshot cache
//!
//! Each key maps to a shared `OnceCell`. The map lock is held only long
//! enough to find or insert the cell; the upstream fetch runs inside
//! `get_or_try_init`, so concurrent callers for one key wait on a single
//! build. A failed build leaves the cell empty and is removed from the map.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use log::debug;
use lru::LruCache;
use tokio::sync::{Mutex, OnceCell};

use crate::error::Result;
use crate::snapshot::{RepositorySnapshot, SnapshotKey};

type Slot = Arc<OnceCell<Arc<RepositorySnapshot>>>;

/// LRU cache of repository snapshots owned by one service instance
pub struct SnapshotCache {
    entries: Mutex<LruCache<SnapshotKey, Slot>>,
}

impl SnapshotCache {
    /// Creates a cache holding at most `capacity` repositories (minimum one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the cached snapshot for `key`, running `build` at most once
    /// across all concurrent callers until it succeeds
    pub async fn get_or_build<F, Fut>(&self, key: &SnapshotKey, build: F) -> Result<Arc<RepositorySnapshot>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RepositorySnapshot>>,
    {
        let slot = {
            let mut entries = self.entries.lock().await;
            entries.get_or_insert(key.clone(), || Arc::new(OnceCell::new())).clone()
        };

        if slot.initialized() {
            debug!("Snapshot cache hit for {}/{}", key.owner, key.repo);
        }

        let result = slot
            .get_or_try_init(move || async move { build().await.map(Arc::new) })
            .await
            .cloned();

        if result.is_err() {
            let mut entries = self.entries.lock().await;
            let stale = entries
                .peek(key)
                .map_or(false, |current| Arc::ptr_eq(current, &slot) && !current.initialized());
            if stale {
                entries.pop(key);
            }
        }
        result
    }

    /// Number of keys currently held
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache holds nothing
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn snapshot(repo: &str) -> RepositorySnapshot {
        RepositorySnapshot {
            owner: "octocat".into(),
            repo: repo.into(),
            default_branch: "main".into(),
            file_tree: vec!["README".into()],
            readme: "Hello World!".into(),
            file_content: String::new(),
            curated_files: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_build() {
        let cache = Arc::new(SnapshotCache::new(10));
        let builds = Arc::new(AtomicUsize::new(0));
        let key = SnapshotKey::new("octocat", "hello-world", None);

        let calls = (0..8).map(|_| {
            let cache = cache.clone();
            let builds = builds.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .get_or_build(&key, move || async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(snapshot("hello-world"))
                    })
                    .await
            })
        });

        let results = futures::future::join_all(calls).await;
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        let first = results[0].as_ref().unwrap().as_ref().unwrap().clone();
        for result in &results {
            assert!(Arc::ptr_eq(&first, result.as_ref().unwrap().as_ref().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let cache = SnapshotCache::new(10);
        let key = SnapshotKey::new("octocat", "flaky", Some("token"));

        let failed = cache
            .get_or_build(&key, || async { Err(PipelineError::UpstreamTransient("502".into())) })
            .await;
        assert!(matches!(failed, Err(PipelineError::UpstreamTransient(_))));
        assert!(cache.is_empty().await);

        let recovered = cache.get_or_build(&key, || async { Ok(snapshot("flaky")) }).await.unwrap();
        assert_eq!(recovered.repo, "flaky");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_least_recently_used_is_evicted() {
        let cache = SnapshotCache::new(2);
        let builds = AtomicUsize::new(0);
        let build = |repo: &'static str| {
            let builds = &builds;
            move || async move {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(snapshot(repo))
            }
        };

        let a = SnapshotKey::new("octocat", "a", None);
        let b = SnapshotKey::new("octocat", "b", None);
        let c = SnapshotKey::new("octocat", "c", None);

        cache.get_or_build(&a, build("a")).await.unwrap();
        cache.get_or_build(&b, build("b")).await.unwrap();
        cache.get_or_build(&a, build("a")).await.unwrap();
        cache.get_or_build(&c, build("c")).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 3);

        // b was least recently used and had to go
        cache.get_or_build(&b, build("b")).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 4);
        cache.get_or_build(&c, build("c")).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 4);
    }
}
