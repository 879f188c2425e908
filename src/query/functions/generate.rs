//! Generators
//!
//! Materialize series from constants over the request window.

use crate::query::ast::format_number;
use crate::query::error::QueryResult;
use crate::query::functions::{Args, CallContext, FunctionKind, FunctionRegistry, FunctionSpec, Param};
use crate::store::TimeSeries;

const DEFAULT_STEP: i64 = 60;

pub(super) fn register(registry: &mut FunctionRegistry) {
    use FunctionKind::Generator;

    registry.register(FunctionSpec::new("constantLine", Generator, constant_line).param(Param::number("value")));
    registry.register(
        FunctionSpec::new("threshold", Generator, threshold)
            .param(Param::number("value"))
            .param(Param::text("label").optional())
            .param(Param::text("color").optional()),
    );
    registry.register(
        FunctionSpec::new("time", Generator, time_function)
            .alias("timeFunction")
            .param(Param::text("name"))
            .param(Param::number("step").optional()),
    );
    registry.register(
        FunctionSpec::new("sin", Generator, sin_function)
            .alias("sinFunction")
            .param(Param::text("name"))
            .param(Param::number("amplitude").optional())
            .param(Param::number("step").optional()),
    );
}

/// Three points at the start, middle and end of the window
fn flat_line(name: String, value: f64, ctx: &CallContext) -> TimeSeries {
    let window = ctx.window;
    let step = (window.duration() / 2).max(1);
    TimeSeries::new(name, window.from, step, vec![Some(value); 3])
}

fn constant_line(args: Args, ctx: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let value = args.number("value").unwrap_or_default();
    Ok(vec![flat_line(format_number(value), value, ctx)])
}

fn threshold(args: Args, ctx: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let value = args.number("value").unwrap_or_default();
    let name = args
        .text("label")
        .map(str::to_string)
        .unwrap_or_else(|| format_number(value));
    Ok(vec![flat_line(name, value, ctx)])
}

fn step_arg(args: &Args) -> QueryResult<i64> {
    match args.count("step")? {
        None => Ok(DEFAULT_STEP),
        Some(0) => Err(args.invalid("step must be positive")),
        Some(step) => Ok(step as i64),
    }
}

/// Sample `f(timestamp)` every `step` seconds across the window
fn sample(name: &str, expr: String, step: i64, ctx: &CallContext, f: impl Fn(i64) -> f64) -> TimeSeries {
    let window = ctx.window;
    let values = (window.from..window.until)
        .step_by(step as usize)
        .map(|t| Some(f(t)))
        .collect();
    TimeSeries::new(name, window.from, step, values).with_path_expression(expr)
}

fn time_function(args: Args, ctx: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let name = args.text("name").unwrap_or_default();
    let step = step_arg(&args)?;
    Ok(vec![sample(name, format!("time({})", name), step, ctx, |t| t as f64)])
}

fn sin_function(args: Args, ctx: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let name = args.text("name").unwrap_or_default();
    let amplitude = args.number("amplitude").unwrap_or(1.0);
    let step = step_arg(&args)?;
    Ok(vec![sample(name, format!("sin({})", name), step, ctx, |t| {
        amplitude * (t as f64).sin()
    })])
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, ctx};
    use super::super::{FunctionRegistry, Value};
    use crate::query::error::QueryError;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_constant_line() {
        let out = call("constantLine", vec![Value::Number(12.0)]).unwrap();
        let line = &out[0];
        assert_eq!(line.name, "12");
        assert_eq!(line.values, vec![Some(12.0); 3]);
        assert_eq!(line.step, 1800);
        let stamps: Vec<i64> = line.points().map(|(t, _)| t).collect();
        assert_eq!(stamps, vec![0, 1800, 3600]);
    }

    #[test]
    fn test_threshold_label() {
        let out = call("threshold", vec![Value::Number(0.5), text("limit")]).unwrap();
        assert_eq!(out[0].name, "limit");
        let out = call("threshold", vec![Value::Number(0.5)]).unwrap();
        assert_eq!(out[0].name, "0.5");
    }

    #[test]
    fn test_sin_defaults() {
        let out = call("sin", vec![text("foo")]).unwrap();
        let wave = &out[0];
        assert_eq!(wave.name, "foo");
        assert_eq!(wave.path_expression, "sin(foo)");
        assert_eq!(wave.step, 60);
        assert_eq!(wave.len(), 60);
        assert_eq!(wave.values[0], Some(0.0));

        let doubled = call("sinFunction", vec![text("bar"), Value::Number(2.0)]).unwrap();
        assert_eq!(doubled[0].values[1], Some(2.0 * 60f64.sin()));
    }

    #[test]
    fn test_time_function() {
        let registry = FunctionRegistry::with_builtins();
        let out = registry
            .get("timeFunction")
            .unwrap()
            .invoke(vec![text("clock"), Value::Number(600.0)], vec![], &ctx(100, 1300))
            .unwrap();
        assert_eq!(out[0].values, vec![Some(100.0), Some(700.0)]);
        assert_eq!(out[0].name, "clock");
    }

    #[test]
    fn test_zero_step_rejected() {
        let err = call("time", vec![text("t"), Value::Number(0.0)]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArguments { .. }));
    }
}
