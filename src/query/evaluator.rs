//! Expression Evaluator
//!
//! Walks a target AST against the store:
//! 1. Path patterns are resolved with `Store::find` and every leaf fetched
//! 2. Call arguments are evaluated concurrently, then the function runs
//! 3. Each target's series are concatenated in target order
//!
//! # Evaluation Pipeline
//!
//! ```text
//! target → template expansion → parse → evaluate (fan-out per argument) → series
//! ```
//!
//! The whole evaluation of a request runs under one deadline. Concurrent
//! fetches complete in any order but results are always joined in argument
//! order, so output ordering never depends on timing.

use futures_util::future::{join_all, try_join_all, BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::query::ast::Expr;
use crate::query::error::{QueryError, QueryResult};
use crate::query::functions::{CallContext, FunctionRegistry, Value};
use crate::query::parser::parse_target;
use crate::query::template::{self, TemplateArgs};
use crate::query::timerange::TimeWindow;
use crate::store::{Store, TimeSeries};

/// Default request deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Evaluates target expressions
///
/// Holds only shared, read-only state, so one evaluator serves every request.
pub struct Evaluator {
    store: Arc<Store>,
    registry: Arc<FunctionRegistry>,
    timeout: Duration,
}

impl Evaluator {
    /// Create an evaluator over `store` using the functions in `registry`
    pub fn new(store: Arc<Store>, registry: Arc<FunctionRegistry>) -> Self {
        Self {
            store,
            registry,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Expand templates in a raw target and parse it
    pub fn prepare(target: &str, template_args: &TemplateArgs) -> QueryResult<Expr> {
        let expanded = template::expand(target, template_args)?;
        parse_target(&expanded)
    }

    /// Expand, parse and evaluate raw targets under the request deadline
    pub async fn evaluate_targets(
        &self,
        targets: &[String],
        template_args: &TemplateArgs,
        window: &TimeWindow,
    ) -> QueryResult<Vec<TimeSeries>> {
        let exprs = targets
            .iter()
            .map(|t| Self::prepare(t, template_args))
            .collect::<QueryResult<Vec<_>>>()?;
        self.evaluate_all(&exprs, window).await
    }

    /// Evaluate parsed targets under the request deadline
    ///
    /// All-or-nothing: on timeout no partial result is returned.
    pub async fn evaluate_all(&self, exprs: &[Expr], window: &TimeWindow) -> QueryResult<Vec<TimeSeries>> {
        let started = Instant::now();
        let work = try_join_all(exprs.iter().map(|e| self.evaluate(e, window)));

        let results = match tokio::time::timeout(self.timeout, work).await {
            Ok(results) => results?,
            Err(_) => {
                let ms = self.timeout.as_millis() as u64;
                tracing::warn!(targets = exprs.len(), timeout_ms = ms, "render deadline exceeded");
                return Err(QueryError::RenderTimeout(ms));
            }
        };

        let series: Vec<TimeSeries> = results.into_iter().flatten().collect();
        tracing::debug!(
            targets = exprs.len(),
            series = series.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "evaluation complete"
        );
        Ok(series)
    }

    /// Evaluate one target; it must produce series
    pub async fn evaluate(&self, expr: &Expr, window: &TimeWindow) -> QueryResult<Vec<TimeSeries>> {
        match self.eval(expr, window).await? {
            Value::SeriesList(series) => Ok(series),
            _ => Err(QueryError::InvalidExpression {
                fragment: expr.to_string(),
                position: 0,
            }),
        }
    }

    fn eval<'a>(&'a self, expr: &'a Expr, window: &'a TimeWindow) -> BoxFuture<'a, QueryResult<Value>> {
        async move {
            match expr {
                Expr::Path(pattern) => Ok(Value::SeriesList(self.fetch_pattern(pattern, window).await?)),
                Expr::Number(n) => Ok(Value::Number(*n)),
                Expr::String(s) => Ok(Value::Text(s.clone())),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Call { name, args, kwargs } => {
                    // Unknown names fail before any fetch is issued
                    let spec = Arc::clone(self.registry.get(name)?);

                    let positional = try_join_all(args.iter().map(|a| self.eval(a, window)));
                    let keyword = try_join_all(kwargs.iter().map(|(key, arg)| async move {
                        Ok::<_, QueryError>((key.clone(), self.eval(arg, window).await?))
                    }));
                    let (positional, keyword) = futures_util::try_join!(positional, keyword)?;

                    let ctx = CallContext { window: *window };
                    Ok(Value::SeriesList(spec.invoke(positional, keyword, &ctx)?))
                }
            }
        }
        .boxed()
    }

    /// Resolve a pattern to series, sorted by path
    ///
    /// Every series carries the pattern as its path expression. A pattern
    /// that matches nothing yields no series.
    pub async fn fetch_pattern(&self, pattern: &str, window: &TimeWindow) -> QueryResult<Vec<TimeSeries>> {
        let nodes = self.store.find(pattern).await?;
        let leaves: Vec<_> = nodes.into_iter().filter(|n| n.is_leaf).collect();

        let fetched = join_all(
            leaves
                .iter()
                .map(|node| self.store.fetch_node(node, window.from, window.until)),
        )
        .await;

        Ok(fetched
            .into_iter()
            .map(|s| s.with_path_expression(pattern))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::template::args_from_params;
    use crate::store::{Finder, MemoryFinder, Node, StoreConfig, StoreResult};
    use async_trait::async_trait;
    use chrono_tz::Tz;

    struct StallingFinder;

    #[async_trait]
    impl Finder for StallingFinder {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn find(&self, pattern: &str) -> StoreResult<Vec<Node>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![Node::leaf(pattern)])
        }

        async fn fetch(&self, path: &str, from: i64, until: i64) -> StoreResult<TimeSeries> {
            Ok(TimeSeries::absent(path, from, until, 60))
        }
    }

    fn create_test_evaluator() -> Evaluator {
        let finder = MemoryFinder::new("memory")
            .with_series("hosts.web2.cpu", 60, &[(60, Some(2.0)), (120, Some(4.0))])
            .with_series("hosts.web1.cpu", 60, &[(60, Some(1.0)), (120, Some(3.0))])
            .with_series("hosts.web1.mem", 60, &[(60, Some(7.0))]);
        let store = Store::new(vec![Arc::new(finder)], StoreConfig::default());
        Evaluator::new(Arc::new(store), Arc::new(FunctionRegistry::with_builtins()))
    }

    fn window(from: i64, until: i64) -> TimeWindow {
        TimeWindow::new(from, until, Tz::UTC).unwrap()
    }

    fn names(series: &[TimeSeries]) -> Vec<&str> {
        series.iter().map(|s| s.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_pattern_results_sorted_by_path() {
        let evaluator = create_test_evaluator();
        let series = evaluator
            .evaluate_targets(&["hosts.*.cpu".to_string()], &TemplateArgs::new(), &window(0, 180))
            .await
            .unwrap();

        assert_eq!(names(&series), vec!["hosts.web1.cpu", "hosts.web2.cpu"]);
        assert!(series.iter().all(|s| s.path_expression == "hosts.*.cpu"));
        assert_eq!(series[0].values, vec![Some(1.0), Some(3.0), None]);
    }

    #[tokio::test]
    async fn test_nonexistent_path_yields_nothing() {
        let evaluator = create_test_evaluator();
        let series = evaluator
            .evaluate_targets(&["nope.*".to_string()], &TemplateArgs::new(), &window(0, 180))
            .await
            .unwrap();
        assert!(series.is_empty());
    }

    #[tokio::test]
    async fn test_sum_of_constant_lines() {
        let evaluator = create_test_evaluator();
        let series = evaluator
            .evaluate_targets(
                &["sumSeries(constantLine(12), constantLine(5))".to_string()],
                &TemplateArgs::new(),
                &window(1_393_398_000, 1_393_401_600),
            )
            .await
            .unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].values, vec![Some(17.0); 3]);
    }

    #[tokio::test]
    async fn test_nested_calls_and_naming() {
        let evaluator = create_test_evaluator();
        let series = evaluator
            .evaluate_targets(
                &["sumSeries(scale(hosts.web1.cpu, 2), hosts.web2.cpu)".to_string()],
                &TemplateArgs::new(),
                &window(0, 120),
            )
            .await
            .unwrap();

        assert_eq!(series[0].name, "sumSeries(hosts.web2.cpu,scale(hosts.web1.cpu,2))");
        assert_eq!(series[0].values, vec![Some(4.0), Some(10.0)]);
    }

    #[tokio::test]
    async fn test_targets_keep_request_order() {
        let evaluator = create_test_evaluator();
        let targets = vec!["hosts.web1.mem".to_string(), "hosts.web1.cpu".to_string()];
        let series = evaluator
            .evaluate_targets(&targets, &TemplateArgs::new(), &window(0, 120))
            .await
            .unwrap();
        assert_eq!(names(&series), vec!["hosts.web1.mem", "hosts.web1.cpu"]);
    }

    #[tokio::test]
    async fn test_template_sources_agree() {
        let evaluator = create_test_evaluator();
        let w = window(0, 3600);

        let inline = evaluator
            .evaluate_targets(&["template(constantLine($1), 12)".to_string()], &TemplateArgs::new(), &w)
            .await
            .unwrap();
        let external = evaluator
            .evaluate_targets(
                &["template(constantLine($1))".to_string()],
                &args_from_params([("1", "12")]),
                &w,
            )
            .await
            .unwrap();

        assert_eq!(inline[0].name, "12");
        assert_eq!(inline, external);
    }

    #[tokio::test]
    async fn test_evaluation_is_repeatable() {
        let evaluator = create_test_evaluator();
        let expr = Evaluator::prepare("movingAverage(hosts.*.cpu, 2)", &TemplateArgs::new()).unwrap();
        let w = window(0, 180);

        let first = evaluator.evaluate_all(std::slice::from_ref(&expr), &w).await.unwrap();
        let second = evaluator.evaluate_all(std::slice::from_ref(&expr), &w).await.unwrap();
        assert_eq!(first, second);
    }

    async fn error_for(evaluator: &Evaluator, target: &str) -> QueryError {
        evaluator
            .evaluate_targets(&[target.to_string()], &TemplateArgs::new(), &window(0, 60))
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_errors() {
        let evaluator = create_test_evaluator();

        assert_eq!(
            error_for(&evaluator, "bogus(a.b)").await,
            QueryError::UnknownFunction("bogus".to_string())
        );
        assert!(matches!(
            error_for(&evaluator, "scale(a.b)").await,
            QueryError::InvalidArguments { .. }
        ));
        assert!(matches!(
            error_for(&evaluator, "12").await,
            QueryError::InvalidExpression { .. }
        ));
        assert!(matches!(
            error_for(&evaluator, "a.b:c").await,
            QueryError::InvalidExpression { position: 3, .. }
        ));
        assert!(matches!(
            error_for(&evaluator, "hosts.[").await,
            QueryError::InvalidExpression { .. }
        ));
    }

    #[tokio::test]
    async fn test_deadline() {
        let store = Store::new(vec![Arc::new(StallingFinder)], StoreConfig::default());
        let evaluator = Evaluator::new(Arc::new(store), Arc::new(FunctionRegistry::with_builtins()))
            .with_timeout(Duration::from_millis(50));

        let err = evaluator
            .evaluate_targets(&["slow.metric".to_string()], &TemplateArgs::new(), &window(0, 60))
            .await
            .unwrap_err();
        assert_eq!(err, QueryError::RenderTimeout(50));
    }
}
