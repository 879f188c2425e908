//! Remote finder
//!
//! Federates another render API over HTTP. Patterns are resolved through the
//! remote `/metrics/find` endpoint and leaves fetched through `/render` with
//! `format=json`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::store::error::{StoreError, StoreResult};
use crate::store::finder::Finder;
use crate::store::types::{Node, TimeSeries};

/// Entry of a treejson `/metrics/find` response
#[derive(Debug, Deserialize)]
struct FindEntry {
    id: String,
    #[serde(default)]
    leaf: serde_json::Value,
}

impl FindEntry {
    fn is_leaf(&self) -> bool {
        self.leaf
            .as_bool()
            .or_else(|| self.leaf.as_i64().map(|v| v != 0))
            .unwrap_or(false)
    }
}

/// Entry of a json `/render` response
#[derive(Debug, Deserialize)]
struct RenderEntry {
    #[allow(dead_code)]
    target: String,
    datapoints: Vec<(Option<f64>, i64)>,
}

/// Finder that queries a remote render API
#[derive(Debug, Clone)]
pub struct RemoteFinder {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl RemoteFinder {
    /// Create a finder for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            name: format!("remote:{}", base_url),
            base_url,
            client,
        })
    }

    /// Base URL of the remote API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> StoreResult<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(StoreError::BackendUnavailable(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(format!("{}: {}", url, e)))
    }
}

/// Turn json datapoints into a fixed-step series
fn series_from_datapoints(
    path: &str,
    datapoints: &[(Option<f64>, i64)],
    from: i64,
    until: i64,
) -> TimeSeries {
    match datapoints {
        [] => TimeSeries::new(path, from, (until - from).max(1), Vec::new()),
        [(value, ts)] => TimeSeries::new(path, *ts, (until - from).max(1), vec![*value]),
        [(_, first), (_, second), ..] => {
            let values = datapoints.iter().map(|(v, _)| *v).collect();
            TimeSeries::new(path, *first, (second - first).max(1), values)
        }
    }
}

#[async_trait]
impl Finder for RemoteFinder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, pattern: &str) -> StoreResult<Vec<Node>> {
        let entries: Vec<FindEntry> = self
            .get_json("/metrics/find", &[("query", pattern.to_string())])
            .await?;

        let mut nodes: Vec<Node> = entries
            .into_iter()
            .map(|e| {
                if e.is_leaf() {
                    Node::leaf(e.id)
                } else {
                    Node::branch(e.id)
                }
            })
            .collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(nodes)
    }

    async fn fetch(&self, path: &str, from: i64, until: i64) -> StoreResult<TimeSeries> {
        let entries: Vec<RenderEntry> = self
            .get_json(
                "/render",
                &[
                    ("target", path.to_string()),
                    ("from", from.to_string()),
                    ("until", until.to_string()),
                    ("format", "json".to_string()),
                ],
            )
            .await?;

        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        Ok(series_from_datapoints(path, &entry.datapoints, from, until))
    }
}
