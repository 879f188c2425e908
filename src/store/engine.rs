//! Store
//!
//! Owns the ordered set of finders and fans `find`/`fetch` out to all of them
//! concurrently.
//!
//! # Merge Rules
//!
//! ```text
//! find:  union of all finder results, deduplicated by path, sorted by path
//!        a finder that fails is skipped; only total failure is an error
//! fetch: ask only the finders that reported the leaf; keep the series with
//!        the most present samples (earliest registered finder on ties);
//!        no series at all yields an all-absent series, never an error
//! ```

use futures_util::future::join_all;
use serde::Deserialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::store::error::{StoreError, StoreResult};
use crate::store::finder::Finder;
use crate::store::matcher::PathMatcher;
use crate::store::types::{Node, TimeSeries};

/// Which answer wins when finders disagree on branch vs leaf
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafConflictPolicy {
    /// The earliest registered finder's answer stands
    #[default]
    FirstRegistered,
    /// Any finder reporting a leaf makes the node a leaf
    PreferLeaf,
}

/// Store tuning
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Upper bound on a single finder call
    pub finder_timeout: Duration,
    /// Step of the all-absent series returned when no finder has data
    pub default_step: i64,
    /// Branch/leaf disagreement policy
    pub leaf_conflict: LeafConflictPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            finder_timeout: Duration::from_secs(10),
            default_step: 60,
            leaf_conflict: LeafConflictPolicy::FirstRegistered,
        }
    }
}

/// Read-only fan-out over registered finders, shared by all requests
pub struct Store {
    finders: Vec<Arc<dyn Finder>>,
    config: StoreConfig,
}

impl Store {
    /// Create a store; finder order is the registration order
    pub fn new(finders: Vec<Arc<dyn Finder>>, config: StoreConfig) -> Self {
        Self { finders, config }
    }

    /// Number of registered finders
    pub fn finder_count(&self) -> usize {
        self.finders.len()
    }

    /// Names of registered finders, in order
    pub fn finder_names(&self) -> Vec<String> {
        self.finders.iter().map(|f| f.name().to_string()).collect()
    }

    /// Store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Resolve a pattern against every finder
    pub async fn find(&self, pattern: &str) -> StoreResult<Vec<Node>> {
        let matcher = PathMatcher::compile_recursive(pattern)?;
        let recursive = matcher.has_recursive();

        let eligible: Vec<(usize, &Arc<dyn Finder>)> = self
            .finders
            .iter()
            .enumerate()
            .filter(|(_, f)| !recursive || f.supports_recursive())
            .collect();

        if eligible.is_empty() {
            tracing::debug!(pattern, "no finder can resolve pattern");
            return Ok(Vec::new());
        }

        let timeout = self.config.finder_timeout;
        let calls = eligible.iter().map(|(idx, finder)| async move {
            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, finder.find(pattern)).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::BackendUnavailable(format!(
                    "find timed out after {:?}",
                    timeout
                ))),
            };
            tracing::debug!(
                finder = finder.name(),
                pattern,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "find completed"
            );
            (*idx, finder.name(), result)
        });

        let results = join_all(calls).await;

        let mut merged: BTreeMap<String, Node> = BTreeMap::new();
        let mut failures = Vec::new();

        for (idx, name, result) in results {
            let nodes = match result {
                Ok(nodes) => nodes,
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => {
                    tracing::warn!(finder = name, pattern, error = %e, "finder failed, skipping");
                    failures.push(format!("{}: {}", name, e));
                    continue;
                }
            };

            for node in nodes {
                self.merge_node(&mut merged, idx, name, node);
            }
        }

        if failures.len() == eligible.len() {
            return Err(StoreError::BackendUnavailable(failures.join("; ")));
        }

        Ok(merged.into_values().collect())
    }

    fn merge_node(&self, merged: &mut BTreeMap<String, Node>, idx: usize, name: &str, node: Node) {
        match merged.entry(node.path.clone()) {
            Entry::Vacant(slot) => {
                let mut node = node;
                node.sources = if node.is_leaf { vec![idx] } else { Vec::new() };
                slot.insert(node);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.is_leaf != node.is_leaf {
                    tracing::warn!(
                        path = %node.path,
                        finder = name,
                        reported_leaf = node.is_leaf,
                        "finders disagree on branch/leaf"
                    );
                    if self.config.leaf_conflict == LeafConflictPolicy::PreferLeaf {
                        existing.is_leaf = true;
                    }
                }
                if node.is_leaf && existing.is_leaf {
                    existing.sources.push(idx);
                }
            }
        }
    }

    /// Fetch a leaf from the finders that reported it
    ///
    /// Never fails: if no finder returns a series the result is an all-absent
    /// series spanning the window at the default step.
    pub async fn fetch_node(&self, node: &Node, from: i64, until: i64) -> TimeSeries {
        let candidates: Vec<(usize, &Arc<dyn Finder>)> = if node.sources.is_empty() {
            self.finders.iter().enumerate().collect()
        } else {
            node.sources
                .iter()
                .filter_map(|&idx| self.finders.get(idx).map(|f| (idx, f)))
                .collect()
        };

        let timeout = self.config.finder_timeout;
        let path = node.path.as_str();
        let calls = candidates.iter().map(|(idx, finder)| async move {
            let result = match tokio::time::timeout(timeout, finder.fetch(path, from, until)).await
            {
                Ok(result) => result,
                Err(_) => Err(StoreError::BackendUnavailable(format!(
                    "fetch timed out after {:?}",
                    timeout
                ))),
            };
            (*idx, finder.name(), result)
        });

        let mut best: Option<TimeSeries> = None;
        for (_, name, result) in join_all(calls).await {
            match result {
                Ok(series) => {
                    let better = best
                        .as_ref()
                        .map(|b| series.present_count() > b.present_count())
                        .unwrap_or(true);
                    if better {
                        best = Some(series);
                    }
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(finder = name, path, "leaf not found in finder");
                }
                Err(e) => {
                    tracing::warn!(finder = name, path, error = %e, "fetch failed, skipping");
                }
            }
        }

        match best {
            Some(series) if series.name == node.path => series,
            Some(series) => series.renamed(node.path.clone()),
            None => TimeSeries::absent(path, from, until, self.config.default_step),
        }
    }

    /// Fetch a concrete path
    ///
    /// Resolves which finders own the leaf first. A path nobody knows is not
    /// an error: it yields an all-absent series.
    pub async fn fetch(&self, path: &str, from: i64, until: i64) -> TimeSeries {
        let node = match self.find(path).await {
            Ok(nodes) => nodes.into_iter().find(|n| n.is_leaf && n.path == path),
            Err(e) => {
                tracing::warn!(path, error = %e, "could not resolve leaf");
                None
            }
        };

        match node {
            Some(node) => self.fetch_node(&node, from, until).await,
            None => TimeSeries::absent(path, from, until, self.config.default_step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryFinder;
    use async_trait::async_trait;

    struct FailingFinder;

    #[async_trait]
    impl Finder for FailingFinder {
        fn name(&self) -> &str {
            "failing"
        }

        async fn find(&self, _pattern: &str) -> StoreResult<Vec<Node>> {
            Err(StoreError::BackendUnavailable("down".to_string()))
        }

        async fn fetch(&self, _path: &str, _from: i64, _until: i64) -> StoreResult<TimeSeries> {
            Err(StoreError::BackendUnavailable("down".to_string()))
        }
    }

    struct SlowFinder;

    #[async_trait]
    impl Finder for SlowFinder {
        fn name(&self) -> &str {
            "slow"
        }

        async fn find(&self, _pattern: &str) -> StoreResult<Vec<Node>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![Node::leaf("slow.metric")])
        }

        async fn fetch(&self, path: &str, from: i64, until: i64) -> StoreResult<TimeSeries> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(TimeSeries::absent(path, from, until, 1))
        }
    }

    fn create_test_store(finders: Vec<Arc<dyn Finder>>) -> Store {
        Store::new(
            finders,
            StoreConfig {
                finder_timeout: Duration::from_millis(100),
                ..StoreConfig::default()
            },
        )
    }

    fn memory(name: &str, paths: &[&str]) -> MemoryFinder {
        let mut finder = MemoryFinder::new(name);
        for path in paths {
            finder.insert(*path, 1, &[]);
        }
        finder
    }

    #[tokio::test]
    async fn test_find_merges_and_sorts() {
        let a = memory("a", &["test.welp", "test.foo"]);
        let b = memory("b", &["test.baz", "test.foo"]);
        let store = create_test_store(vec![Arc::new(a), Arc::new(b)]);

        let nodes = store.find("test.*").await.unwrap();
        let paths: Vec<_> = nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["test.baz", "test.foo", "test.welp"]);

        let foo = nodes.iter().find(|n| n.path == "test.foo").unwrap();
        assert_eq!(foo.sources, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_find_tolerates_partial_failure() {
        let a = memory("a", &["test.foo"]);
        let store = create_test_store(vec![Arc::new(FailingFinder), Arc::new(a)]);

        let nodes = store.find("test.*").await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].sources, vec![1]);
    }

    #[tokio::test]
    async fn test_find_fails_when_all_fail() {
        let store = create_test_store(vec![Arc::new(FailingFinder), Arc::new(SlowFinder)]);
        let result = store.find("test.*").await;
        assert!(matches!(result, Err(StoreError::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_find_rejects_invalid_pattern() {
        let store = create_test_store(vec![Arc::new(memory("a", &["a"]))]);
        let result = store.find("a.[b").await;
        assert!(matches!(result, Err(StoreError::InvalidPattern(_))));
    }

    #[tokio::test]
    async fn test_leaf_conflict_first_registered_wins() {
        let a = memory("a", &["test.foo.bar"]);
        let b = memory("b", &["test.foo"]);
        let store = create_test_store(vec![Arc::new(a), Arc::new(b)]);

        let nodes = store.find("test.foo").await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(!nodes[0].is_leaf);

        let prefer_leaf = Store::new(
            vec![
                Arc::new(memory("a", &["test.foo.bar"])) as Arc<dyn Finder>,
                Arc::new(memory("b", &["test.foo"])),
            ],
            StoreConfig {
                leaf_conflict: LeafConflictPolicy::PreferLeaf,
                ..StoreConfig::default()
            },
        );
        let nodes = prefer_leaf.find("test.foo").await.unwrap();
        assert!(nodes[0].is_leaf);
        assert_eq!(nodes[0].sources, vec![1]);
    }

    #[tokio::test]
    async fn test_recursive_pattern_skips_unsupported_finders() {
        let store = create_test_store(vec![
            Arc::new(FailingFinder),
            Arc::new(memory("a", &["a.b.c"])),
        ]);
        let nodes = store.find("a.**").await.unwrap();
        assert!(nodes.iter().any(|n| n.path == "a.b.c"));
    }

    #[tokio::test]
    async fn test_fetch_prefers_most_present_samples() {
        let empty = MemoryFinder::new("empty").with_series("test", 1, &[]);
        let full = MemoryFinder::new("full").with_series(
            "test",
            1,
            &[(98, Some(1.0)), (99, Some(0.5)), (100, Some(1.5))],
        );
        let store = create_test_store(vec![Arc::new(empty), Arc::new(full)]);

        let series = store.fetch("test", 40, 100).await;
        assert_eq!(series.present_count(), 3);
        assert_eq!(series.name, "test");
    }

    #[tokio::test]
    async fn test_fetch_tie_goes_to_first_registered() {
        let first = MemoryFinder::new("first").with_series("test", 1, &[(99, Some(1.0))]);
        let second = MemoryFinder::new("second").with_series("test", 1, &[(99, Some(2.0))]);
        let store = create_test_store(vec![Arc::new(first), Arc::new(second)]);

        let series = store.fetch("test", 40, 100).await;
        assert!(series.values.contains(&Some(1.0)));
    }

    #[tokio::test]
    async fn test_fetch_never_fails() {
        let store = create_test_store(vec![Arc::new(FailingFinder), Arc::new(SlowFinder)]);

        let series = store.fetch("nonexistent.metric", 0, 600).await;
        assert_eq!(series.len(), 10);
        assert_eq!(series.step, 60);
        assert!(series.is_all_absent());
        assert_eq!(series.name, "nonexistent.metric");
    }

    #[tokio::test]
    async fn test_fetch_node_times_out_slow_finder() {
        let store = create_test_store(vec![Arc::new(SlowFinder)]);
        let node = Node::leaf("slow.metric");

        let series = store.fetch_node(&node, 0, 120).await;
        assert!(series.is_all_absent());
        assert_eq!(series.len(), 2);
    }
}
