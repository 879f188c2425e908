//! Metrics Routes
//!
//! Browsing endpoints over the finder tree.
//!
//! - GET /metrics/find?query=P[&format=treejson|completer] - Nodes matching a pattern
//! - GET /metrics/expand?query=P[&query=Q][&leavesOnly=1] - Expand patterns to paths

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::api::dto::{CompleterEntry, CompleterResponse, ExpandResponse, FindParams, TreeNode};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::query::QueryError;
use crate::store::{Node, StoreError};

/// GET /metrics/find
pub async fn find_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FindParams>,
) -> ApiResult<Response> {
    let query = params
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::field("query", "This parameter is required."))?;

    let format = params.format.unwrap_or_else(|| "treejson".to_string());
    if format != "treejson" && format != "completer" {
        return Err(ApiError::field(
            "format",
            format!(
                "Invalid format '{}', must be one of 'treejson', 'completer'.",
                format
            ),
        ));
    }

    let nodes = state.store().find(&query).await.map_err(find_error)?;
    tracing::debug!(query = %query, nodes = nodes.len(), "find");

    if format == "completer" {
        Ok(Json(completer(&nodes)).into_response())
    } else {
        Ok(Json(tree_json(&nodes)).into_response())
    }
}

/// GET /metrics/expand
pub async fn expand_metrics(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<ExpandResponse>> {
    let mut queries = Vec::new();
    let mut leaves_only = false;
    for (key, value) in pairs {
        match key.as_str() {
            "query" if !value.trim().is_empty() => queries.push(value),
            "leavesOnly" => leaves_only = matches!(value.as_str(), "1" | "true"),
            _ => {}
        }
    }
    if queries.is_empty() {
        return Err(ApiError::field("query", "This parameter is required."));
    }

    let mut results = BTreeSet::new();
    for query in &queries {
        let nodes = state.store().find(query).await.map_err(find_error)?;
        results.extend(
            nodes
                .into_iter()
                .filter(|n| n.is_leaf || !leaves_only)
                .map(|n| n.path),
        );
    }

    Ok(Json(ExpandResponse {
        results: results.into_iter().collect(),
    }))
}

/// Bad patterns are reported against the `query` field
fn find_error(err: StoreError) -> ApiError {
    match QueryError::from(err) {
        e if e.is_client_error() => ApiError::field("query", e.to_string()),
        e => e.into(),
    }
}

fn tree_json(nodes: &[Node]) -> Vec<TreeNode> {
    nodes
        .iter()
        .map(|node| {
            let branch = u8::from(!node.is_leaf);
            TreeNode {
                allow_children: branch,
                expandable: branch,
                leaf: u8::from(node.is_leaf),
                id: node.path.clone(),
                text: node.name().to_string(),
                context: serde_json::Map::new(),
            }
        })
        .collect()
}

fn completer(nodes: &[Node]) -> CompleterResponse {
    CompleterResponse {
        metrics: nodes
            .iter()
            .map(|node| CompleterEntry {
                path: if node.is_leaf {
                    node.path.clone()
                } else {
                    format!("{}.", node.path)
                },
                name: node.name().to_string(),
                is_leaf: if node.is_leaf { "1" } else { "0" }.to_string(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_json() {
        let nodes = vec![Node::branch("hosts.web1"), Node::leaf("hosts.cpu")];
        let tree = tree_json(&nodes);

        assert_eq!(tree[0].text, "web1");
        assert_eq!((tree[0].leaf, tree[0].expandable), (0, 1));
        assert_eq!(tree[1].id, "hosts.cpu");
        assert_eq!((tree[1].leaf, tree[1].allow_children), (1, 0));
    }

    #[test]
    fn test_completer() {
        let nodes = vec![Node::branch("hosts.web1"), Node::leaf("hosts.cpu")];
        let out = completer(&nodes);

        assert_eq!(out.metrics[0].path, "hosts.web1.");
        assert_eq!(out.metrics[0].is_leaf, "0");
        assert_eq!(out.metrics[1].name, "cpu");
    }
}
