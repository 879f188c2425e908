//! Core data types for metric resolution
//!
//! This module defines the types that flow between finders, the store and the
//! evaluator:
//! - `Node`: A branch or leaf in the dotted metric namespace
//! - `TimeSeries`: Fixed-step samples with absent markers
//! - `Consolidation`: How a series is downsampled further

use serde::{Deserialize, Serialize};

/// A point in the metric namespace
///
/// Branches group other nodes, leaves are fetchable. Nodes are produced by
/// finders and live for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Full dotted path (e.g. `hosts.worker1.cpu`)
    pub path: String,
    /// Whether this node carries a series
    pub is_leaf: bool,
    /// Indices of the finders that reported this path as a leaf
    pub(crate) sources: Vec<usize>,
}

impl Node {
    /// Create a leaf node
    pub fn leaf(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_leaf: true,
            sources: Vec::new(),
        }
    }

    /// Create a branch node
    pub fn branch(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_leaf: false,
            sources: Vec::new(),
        }
    }

    /// Last dotted segment of the path
    pub fn name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }
}

/// How samples falling into one coarser bucket are merged
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Consolidation {
    /// Mean of present samples
    #[default]
    Average,
    /// Sum of present samples
    Sum,
    /// Largest present sample
    Max,
    /// Smallest present sample
    Min,
    /// Latest present sample
    Last,
}

impl Consolidation {
    /// Merge a bucket of samples; absent samples are ignored and a bucket
    /// with no present sample stays absent
    pub fn apply(&self, values: &[Option<f64>]) -> Option<f64> {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return None;
        }

        Some(match self {
            Self::Average => present.iter().sum::<f64>() / present.len() as f64,
            Self::Sum => present.iter().sum(),
            Self::Max => present.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => present.iter().cloned().fold(f64::INFINITY, f64::min),
            Self::Last => *present.last()?,
        })
    }

    /// Parse from the names accepted by `consolidateBy`
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "avg" | "average" => Some(Self::Average),
            "sum" => Some(Self::Sum),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "last" => Some(Self::Last),
            _ => None,
        }
    }
}

impl std::fmt::Display for Consolidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Average => write!(f, "average"),
            Self::Sum => write!(f, "sum"),
            Self::Max => write!(f, "max"),
            Self::Min => write!(f, "min"),
            Self::Last => write!(f, "last"),
        }
    }
}

/// A fixed-step series covering `[start, end)`
///
/// `values.len() * step == end - start` always holds; timestamps are epoch
/// seconds. Series are never mutated once built, functions derive new ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    /// Display name (the `target` label in output)
    pub name: String,
    /// Expression this series was produced from
    pub path_expression: String,
    /// First timestamp (inclusive)
    pub start: i64,
    /// End timestamp (exclusive)
    pub end: i64,
    /// Seconds between samples
    pub step: i64,
    /// Samples, `None` marks absent data
    pub values: Vec<Option<f64>>,
    /// Function used to downsample this series
    pub consolidation: Consolidation,
}

impl TimeSeries {
    /// Build a series from samples starting at `start`
    pub fn new(name: impl Into<String>, start: i64, step: i64, values: Vec<Option<f64>>) -> Self {
        let name = name.into();
        let step = step.max(1);
        Self {
            path_expression: name.clone(),
            name,
            start,
            end: start + step * values.len() as i64,
            step,
            values,
            consolidation: Consolidation::default(),
        }
    }

    /// A series of absent samples spanning `[start, end)`
    pub fn absent(name: impl Into<String>, start: i64, end: i64, step: i64) -> Self {
        let step = step.max(1);
        let len = if end > start {
            ((end - start) + step - 1) / step
        } else {
            0
        };
        Self::new(name, start, step, vec![None; len as usize])
    }

    /// Set the path expression (builder style)
    pub fn with_path_expression(mut self, expr: impl Into<String>) -> Self {
        self.path_expression = expr.into();
        self
    }

    /// Set the consolidation function (builder style)
    pub fn with_consolidation(mut self, consolidation: Consolidation) -> Self {
        self.consolidation = consolidation;
        self
    }

    /// Copy of this series under a new name; the path expression follows
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path_expression: name.clone(),
            name,
            ..self.clone()
        }
    }

    /// Copy of this series with transformed samples and a new name
    pub fn derive(&self, name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        let name = name.into();
        Self {
            path_expression: name.clone(),
            name,
            start: self.start,
            end: self.start + self.step * values.len() as i64,
            step: self.step,
            values,
            consolidation: self.consolidation,
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no samples
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of present samples
    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Whether every sample is absent
    pub fn is_all_absent(&self) -> bool {
        self.values.iter().all(|v| v.is_none())
    }

    /// Timestamp of the sample at `index`
    pub fn timestamp_at(&self, index: usize) -> i64 {
        self.start + self.step * index as i64
    }

    /// Iterate over `(timestamp, value)` pairs
    pub fn points(&self) -> impl Iterator<Item = (i64, Option<f64>)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, v)| (self.timestamp_at(i), *v))
    }

    /// Present samples only
    pub fn present_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().flatten().copied()
    }
}
