//! Render Routes
//!
//! - GET /render - Evaluate targets, parameters in the query string
//! - POST /render - Same, parameters form-encoded in the body
//!
//! Data formats are serialized in-process; image formats need a
//! configured chart renderer.

use axum::{
    extract::{Form, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::api::dto::RenderRequest;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::query::consolidate_to_max_points;
use crate::render::{serialize, RenderError};

type Pairs = Vec<(String, String)>;

/// GET /render
pub async fn render_get(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Pairs>,
) -> ApiResult<Response> {
    render(&state, pairs).await
}

/// POST /render
///
/// Query-string and body parameters are merged, query string first.
pub async fn render_post(
    State(state): State<Arc<AppState>>,
    Query(mut pairs): Query<Pairs>,
    Form(body): Form<Pairs>,
) -> ApiResult<Response> {
    pairs.extend(body);
    render(&state, pairs).await
}

async fn render(state: &AppState, pairs: Pairs) -> ApiResult<Response> {
    let started = Instant::now();
    let request =
        RenderRequest::from_pairs(&pairs, &state.resolver, Utc::now()).map_err(ApiError::Validation)?;

    // Refuse image requests before doing any work
    let chart_renderer = if request.format.is_image() {
        match &state.chart_renderer {
            Some(renderer) if renderer.supports(request.format) => Some(Arc::clone(renderer)),
            _ => return Err(RenderError::Unsupported(request.format).into()),
        }
    } else {
        None
    };

    let mut series = state
        .evaluator
        .evaluate_all(&request.exprs, &request.window)
        .await?;

    if let Some(max_points) = request.max_data_points {
        series = series
            .iter()
            .map(|s| consolidate_to_max_points(s, max_points))
            .collect();
    }

    tracing::info!(
        targets = request.targets.len(),
        series = series.len(),
        format = %request.format,
        from = request.window.from,
        until = request.window.until,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "render"
    );

    let (content_type, body) = match chart_renderer {
        Some(renderer) => {
            let image = renderer
                .render(request.format, &series, &request.chart)
                .await?;
            (request.format.content_type(), image)
        }
        None => {
            let rendered = serialize(request.format, &series, &request.serialize_options())?;
            (rendered.content_type, rendered.body)
        }
    };

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response())
}
