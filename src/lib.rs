//! # graphite-render
//!
//! A Graphite-compatible render API: resolves dotted metric paths across
//! pluggable finders, evaluates target expressions into aligned series and
//! serializes them.
//!
//! ## Features
//!
//! - **Pluggable finders**: in-memory, CSV directory trees, remote render APIs
//! - **Target language**: globs, nested function calls and templates
//! - **Time ranges**: relative offsets, named references and timezones
//! - **Output**: json, raw, csv, dygraph and rickshaw, with a seam for charts
//!
//! ## Modules
//!
//! - [`store`]: finders and the fan-out store
//! - [`query`]: parsing, templates, time ranges and evaluation
//! - [`render`]: output serializers
//! - [`api`]: REST API server with Axum
//! - [`config`]: TOML configuration and logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graphite_render::query::{Evaluator, FunctionRegistry, TemplateArgs, TimeRangeResolver};
//! use graphite_render::render::{serialize, OutputFormat, SerializeOptions};
//! use graphite_render::store::{MemoryFinder, Store, StoreConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let finder = MemoryFinder::new("memory").with_series("hosts.web1.cpu", 60, &[]);
//!     let store = Arc::new(Store::new(vec![Arc::new(finder)], StoreConfig::default()));
//!     let evaluator = Evaluator::new(store, Arc::new(FunctionRegistry::with_builtins()));
//!
//!     let window = TimeRangeResolver::default().resolve(Some("-1h"), None, None, chrono::Utc::now())?;
//!     let expr = Evaluator::prepare("scale(hosts.*.cpu, 100)", &TemplateArgs::new())?;
//!     let series = evaluator.evaluate_all(&[expr], &window).await?;
//!
//!     let rendered = serialize(OutputFormat::Json, &series, &SerializeOptions::default())?;
//!     println!("{}", rendered.text());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod query;
pub mod render;
pub mod store;

pub use store::{Finder, Node, Store, StoreConfig, StoreError, TimeSeries};

pub use query::{Evaluator, Expr, FunctionRegistry, QueryError, TimeRangeResolver, TimeWindow};

pub use render::{ChartRenderer, OutputFormat, RenderError};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use config::{Config, ConfigError, FinderConfig, LoggingConfig};
