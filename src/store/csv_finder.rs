//! CSV directory finder
//!
//! Serves a directory tree of CSV files. Directories are branches and each
//! `<name>.csv` file is a leaf, so `<root>/hosts/worker1/cpu.csv` is the leaf
//! `hosts.worker1.cpu`.
//!
//! # File Format
//!
//! ```text
//! 1393398000,12.5
//! 1393398060,
//! 1393398120,13.0
//! ```
//!
//! One `epoch_seconds,value` row per sample; an empty value is absent data.
//! Rows whose timestamp does not parse (headers, comments) are skipped.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::store::error::{StoreError, StoreResult};
use crate::store::finder::{bucket, sample_points, Finder};
use crate::store::matcher::PathMatcher;
use crate::store::types::{Node, TimeSeries};

const EXTENSION: &str = "csv";

/// Finder over a directory of CSV files
#[derive(Debug, Clone)]
pub struct CsvFinder {
    name: String,
    root: PathBuf,
    step: i64,
}

impl CsvFinder {
    /// Create a finder rooted at `root`, sampling files onto `step` seconds
    pub fn new(root: impl Into<PathBuf>, step: i64) -> Self {
        let root = root.into();
        Self {
            name: format!("csv:{}", root.display()),
            root,
            step: step.max(1),
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn leaf_file(&self, path: &str) -> PathBuf {
        let mut file = self.root.clone();
        let parts: Vec<&str> = path.split('.').collect();
        if let Some((last, dirs)) = parts.split_last() {
            for dir in dirs {
                file.push(dir);
            }
            file.push(format!("{}.{}", last, EXTENSION));
        }
        file
    }
}

/// Walk the tree one pattern segment per directory level
fn walk(root: &Path, matcher: &PathMatcher) -> StoreResult<Vec<Node>> {
    let mut nodes = Vec::new();
    if !root.is_dir() {
        return Err(StoreError::BackendUnavailable(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let last = matcher.segment_count().saturating_sub(1);
    let mut frontier: Vec<(PathBuf, String)> = vec![(root.to_path_buf(), String::new())];

    for depth in 0..matcher.segment_count() {
        let mut next = Vec::new();

        for (dir, prefix) in frontier {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let file_type = entry.file_type()?;
                let file_name = entry.file_name().to_string_lossy().to_string();

                let (segment, is_leaf) = if file_type.is_dir() {
                    (file_name, false)
                } else {
                    match file_name.strip_suffix(&format!(".{}", EXTENSION)) {
                        Some(stem) => (stem.to_string(), true),
                        None => continue,
                    }
                };

                if segment.starts_with('.') || !matcher.segment_matches(depth, &segment) {
                    continue;
                }

                let path = if prefix.is_empty() {
                    segment
                } else {
                    format!("{}.{}", prefix, segment)
                };

                if depth == last {
                    nodes.push(if is_leaf {
                        Node::leaf(path)
                    } else {
                        Node::branch(path)
                    });
                } else if !is_leaf {
                    next.push((entry.path(), path));
                }
            }
        }

        frontier = next;
    }

    nodes.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(nodes)
}

/// Read `timestamp,value` rows from a CSV file
fn read_points(file: &Path, step: i64) -> StoreResult<BTreeMap<i64, Option<f64>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(file)?;

    let mut points = BTreeMap::new();
    for record in reader.records() {
        let record = record?;
        let Some(ts) = record.get(0).and_then(|s| s.parse::<f64>().ok()) else {
            continue;
        };
        let value = record
            .get(1)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<f64>().ok());
        points.insert(bucket(ts as i64, step), value);
    }

    Ok(points)
}

#[async_trait]
impl Finder for CsvFinder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, pattern: &str) -> StoreResult<Vec<Node>> {
        let matcher = PathMatcher::compile(pattern)?;
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || walk(&root, &matcher))
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("walk task failed: {}", e)))?
    }

    async fn fetch(&self, path: &str, from: i64, until: i64) -> StoreResult<TimeSeries> {
        let file = self.leaf_file(path);
        if !file.is_file() {
            return Err(StoreError::NotFound(path.to_string()));
        }

        let step = self.step;
        let points = tokio::task::spawn_blocking(move || read_points(&file, step))
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("read task failed: {}", e)))??;

        Ok(sample_points(path, &points, step, from, until))
    }
}
