//! Finder SPI
//!
//! A finder is one storage backend: it resolves glob patterns to nodes and
//! fetches leaf series. The store fans calls out to every registered finder.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::store::error::StoreResult;
use crate::store::types::{Node, TimeSeries};

/// Common trait for all storage backends
#[async_trait]
pub trait Finder: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Whether `**` segments are understood by `find`
    ///
    /// The store never sends a recursive pattern to a finder that does not
    /// declare support for it.
    fn supports_recursive(&self) -> bool {
        false
    }

    /// Resolve a glob pattern to matching nodes
    async fn find(&self, pattern: &str) -> StoreResult<Vec<Node>>;

    /// Fetch a leaf series over `[from, until)` (epoch seconds)
    async fn fetch(&self, path: &str, from: i64, until: i64) -> StoreResult<TimeSeries>;
}

/// Fixed-step archive window for a request
///
/// Mirrors round-robin archives: the first slot is the one after the slot
/// containing `from`, and the window runs through the slot containing
/// `until`.
pub fn archive_window(from: i64, until: i64, step: i64) -> (i64, i64) {
    let step = step.max(1);
    let start = from - from.rem_euclid(step) + step;
    let end = until - until.rem_euclid(step) + step;
    (start, end.max(start))
}

/// Sample raw `(timestamp, value)` points onto a fixed-step grid
///
/// Points are bucketed by `timestamp - timestamp % step`; the latest point
/// in a bucket wins. Slots without a point are absent.
pub fn sample_points(
    path: &str,
    points: &BTreeMap<i64, Option<f64>>,
    step: i64,
    from: i64,
    until: i64,
) -> TimeSeries {
    let step = step.max(1);
    let (start, end) = archive_window(from, until, step);
    let len = ((end - start) / step) as usize;
    let mut values = vec![None; len];

    for (&ts, &value) in points.range(start..end) {
        let slot = ((ts - start) / step) as usize;
        if slot < len {
            values[slot] = value;
        }
    }

    TimeSeries::new(path, start, step, values)
}

/// Bucket a timestamp onto a step boundary
pub(crate) fn bucket(ts: i64, step: i64) -> i64 {
    ts - ts.rem_euclid(step.max(1))
}
