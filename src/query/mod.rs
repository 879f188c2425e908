//! Graphite Target Language
//!
//! Turns render targets into series:
//!
//! - **Template**: `template(...)` expansion and `$name` substitution
//! - **Parser**: target strings into an [`Expr`] tree
//! - **Time range**: `from`/`until`/`tz` into a [`TimeWindow`]
//! - **Functions**: the registry of series functions
//! - **Evaluator**: walks an expression against the [`Store`](crate::store::Store)
//! - **Align**: common-grid alignment and max-points consolidation
//!
//! # Target Language
//!
//! ```text
//! hosts.*.cpu
//! sumSeries(hosts.{web1,web2}.cpu)
//! alias(movingAverage(hosts.web1.cpu, '5min'), "smooth")
//! template(sumSeries(hosts.$1.cpu), "worker*")
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use graphite_render::query::{Evaluator, TemplateArgs, TimeRangeResolver};
//!
//! let window = TimeRangeResolver::default().resolve(Some("-1h"), None, None, Utc::now())?;
//! let expr = Evaluator::prepare("sumSeries(hosts.*.cpu)", &TemplateArgs::new())?;
//! let series = evaluator.evaluate_all(&[expr], &window).await?;
//! ```

pub mod align;
pub mod ast;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod template;
pub mod timerange;

pub use align::{align, consolidate, consolidate_to_max_points, Aligned};
pub use ast::{format_number, Expr};
pub use error::{QueryError, QueryResult};
pub use evaluator::{Evaluator, DEFAULT_TIMEOUT};
pub use functions::{FunctionKind, FunctionRegistry, FunctionSpec, Value};
pub use parser::{parse_pattern, parse_target};
pub use template::{args_from_params, expand, TemplateArgs, TemplateValue};
pub use timerange::{interval_seconds, parse_timezone, resolve_time, TimeRangeResolver, TimeWindow};
