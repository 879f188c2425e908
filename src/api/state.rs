//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use crate::query::{Evaluator, TimeRangeResolver};
use crate::render::ChartRenderer;
use crate::store::Store;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Target evaluator, owns the store
    pub evaluator: Arc<Evaluator>,
    /// Resolves `from`/`until`/`tz` against the configured default zone
    pub resolver: TimeRangeResolver,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
    /// Draws image formats; without one they answer 501
    pub chart_renderer: Option<Arc<dyn ChartRenderer>>,
}

impl AppState {
    pub fn new(evaluator: Arc<Evaluator>, resolver: TimeRangeResolver, config: ApiConfig) -> Self {
        Self {
            evaluator,
            resolver,
            config: Arc::new(config),
            start_time: Instant::now(),
            chart_renderer: None,
        }
    }

    /// Attach a chart renderer for `svg`/`png`/`pdf`
    pub fn with_chart_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.chart_renderer = Some(renderer);
        self
    }

    pub fn store(&self) -> &Store {
        self.evaluator.store()
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deadline for evaluating one render request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// CORS origins; `*` allows any
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_request_timeout() -> u64 {
    30_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout(),
            allowed_origins: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
