//! In-memory finder
//!
//! Holds a fixed set of series in process. Used for static datasets, tests,
//! and as the reference implementation of the finder contract.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

use crate::store::error::{StoreError, StoreResult};
use crate::store::finder::{bucket, sample_points, Finder};
use crate::store::matcher::PathMatcher;
use crate::store::types::{Node, TimeSeries};

#[derive(Debug, Clone)]
struct StoredSeries {
    step: i64,
    points: BTreeMap<i64, Option<f64>>,
}

/// Finder backed by series held in memory
#[derive(Debug, Clone)]
pub struct MemoryFinder {
    name: String,
    series: BTreeMap<String, StoredSeries>,
}

impl MemoryFinder {
    /// Create an empty finder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            series: BTreeMap::new(),
        }
    }

    /// Register a leaf with raw points; timestamps are bucketed onto `step`
    pub fn insert(&mut self, path: impl Into<String>, step: i64, points: &[(i64, Option<f64>)]) {
        let step = step.max(1);
        let entry = self
            .series
            .entry(path.into())
            .or_insert_with(|| StoredSeries {
                step,
                points: BTreeMap::new(),
            });
        for &(ts, value) in points {
            entry.points.insert(bucket(ts, entry.step), value);
        }
    }

    /// Builder variant of [`insert`](Self::insert)
    pub fn with_series(
        mut self,
        path: impl Into<String>,
        step: i64,
        points: &[(i64, Option<f64>)],
    ) -> Self {
        self.insert(path, step, points);
        self
    }

    /// Number of leaves held
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether no leaves are held
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[async_trait]
impl Finder for MemoryFinder {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_recursive(&self) -> bool {
        true
    }

    async fn find(&self, pattern: &str) -> StoreResult<Vec<Node>> {
        let matcher = PathMatcher::compile_recursive(pattern)?;
        let mut found: HashMap<String, bool> = HashMap::new();

        for path in self.series.keys() {
            let parts: Vec<&str> = path.split('.').collect();
            for len in 1..=parts.len() {
                let prefix = parts[..len].join(".");
                if matcher.matches(&prefix) {
                    let is_leaf = len == parts.len();
                    let entry = found.entry(prefix).or_insert(is_leaf);
                    *entry |= is_leaf;
                }
            }
        }

        let mut nodes: Vec<Node> = found
            .into_iter()
            .map(|(path, is_leaf)| {
                if is_leaf {
                    Node::leaf(path)
                } else {
                    Node::branch(path)
                }
            })
            .collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(nodes)
    }

    async fn fetch(&self, path: &str, from: i64, until: i64) -> StoreResult<TimeSeries> {
        let stored = self
            .series
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(sample_points(path, &stored.points, stored.step, from, until))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_finder() -> MemoryFinder {
        MemoryFinder::new("memory")
            .with_series("hosts.worker1.cpu", 60, &[(120, Some(1.0))])
            .with_series("hosts.worker2.cpu", 60, &[(120, Some(2.0))])
            .with_series("hosts.worker2.mem", 60, &[])
            .with_series("other", 60, &[])
    }

    #[tokio::test]
    async fn test_find_leaves() {
        let finder = create_test_finder();
        let nodes = finder.find("hosts.*.cpu").await.unwrap();

        let paths: Vec<_> = nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["hosts.worker1.cpu", "hosts.worker2.cpu"]);
        assert!(nodes.iter().all(|n| n.is_leaf));
    }

    #[tokio::test]
    async fn test_find_branches() {
        let finder = create_test_finder();
        let nodes = finder.find("hosts.*").await.unwrap();

        let paths: Vec<_> = nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["hosts.worker1", "hosts.worker2"]);
        assert!(nodes.iter().all(|n| !n.is_leaf));

        let top = finder.find("*").await.unwrap();
        assert_eq!(top.len(), 2);
        assert!(!top[0].is_leaf);
        assert!(top[1].is_leaf);
    }

    #[tokio::test]
    async fn test_find_recursive() {
        let finder = create_test_finder();
        let nodes = finder.find("hosts.**.mem").await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].path, "hosts.worker2.mem");
    }

    #[tokio::test]
    async fn test_fetch() {
        let finder = create_test_finder();
        let series = finder.fetch("hosts.worker1.cpu", 0, 300).await.unwrap();

        assert_eq!(series.step, 60);
        assert_eq!(series.start, 60);
        assert_eq!(series.end, 360);
        assert_eq!(series.values[1], Some(1.0));
        assert_eq!(series.present_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_unknown() {
        let finder = create_test_finder();
        let result = finder.fetch("nope", 0, 300).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
