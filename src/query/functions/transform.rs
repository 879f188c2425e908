//! Transformers
//!
//! Map each input series to one output series. Output names wrap the input
//! name, e.g. `scale(hosts.web1.cpu,2)`.

use regex::Regex;

use crate::query::ast::format_number;
use crate::query::error::QueryResult;
use crate::query::functions::{
    Args, CallContext, FunctionKind, FunctionRegistry, FunctionSpec, Param, Value,
};
use crate::query::timerange::interval_seconds;
use crate::store::{Consolidation, TimeSeries};

pub(super) fn register(registry: &mut FunctionRegistry) {
    use FunctionKind::Transformer;

    registry.register(
        FunctionSpec::new("scale", Transformer, scale)
            .param(Param::series("seriesList"))
            .param(Param::number("factor")),
    );
    registry.register(
        FunctionSpec::new("offset", Transformer, offset)
            .param(Param::series("seriesList"))
            .param(Param::number("factor")),
    );
    registry.register(FunctionSpec::new("absolute", Transformer, absolute).param(Param::series("seriesList")));
    registry.register(FunctionSpec::new("invert", Transformer, invert).param(Param::series("seriesList")));
    registry.register(
        FunctionSpec::new("alias", Transformer, alias)
            .param(Param::series("seriesList"))
            .param(Param::text("newName")),
    );
    registry.register(
        FunctionSpec::new("aliasByNode", Transformer, alias_by_node)
            .param(Param::series("seriesList"))
            .param(Param::number("nodes").variadic()),
    );
    registry.register(
        FunctionSpec::new("aliasSub", Transformer, alias_sub)
            .param(Param::series("seriesList"))
            .param(Param::text("search"))
            .param(Param::text("replace")),
    );
    registry.register(FunctionSpec::new("derivative", Transformer, derivative).param(Param::series("seriesList")));
    registry.register(
        FunctionSpec::new("nonNegativeDerivative", Transformer, non_negative_derivative)
            .param(Param::series("seriesList"))
            .param(Param::number("maxValue").optional()),
    );
    registry.register(FunctionSpec::new("integral", Transformer, integral).param(Param::series("seriesList")));
    registry.register(
        FunctionSpec::new("movingAverage", Transformer, moving_average)
            .param(Param::series("seriesList"))
            .param(Param::interval("windowSize")),
    );
    registry.register(
        FunctionSpec::new("transformNull", Transformer, transform_null)
            .param(Param::series("seriesList"))
            .param(Param::number("default").optional()),
    );
    registry.register(
        FunctionSpec::new("keepLastValue", Transformer, keep_last_value)
            .param(Param::series("seriesList"))
            .param(Param::number("limit").optional()),
    );
    registry.register(
        FunctionSpec::new("consolidateBy", Transformer, consolidate_by)
            .param(Param::series("seriesList"))
            .param(Param::text("consolidationFunc")),
    );
}

/// Apply `f` to every present sample
fn map_present(
    series: Vec<TimeSeries>,
    name: impl Fn(&TimeSeries) -> String,
    f: impl Fn(f64) -> Option<f64>,
) -> Vec<TimeSeries> {
    series
        .iter()
        .map(|s| s.derive(name(s), s.values.iter().map(|v| v.and_then(&f)).collect()))
        .collect()
}

fn required_number(args: &Args, name: &str) -> QueryResult<f64> {
    args.number(name)
        .ok_or_else(|| args.invalid(format!("missing required argument '{}'", name)))
}

fn scale(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let factor = required_number(&args, "factor")?;
    let label = format_number(factor);
    Ok(map_present(
        args.series("seriesList"),
        |s| format!("scale({},{})", s.name, label),
        |v| Some(v * factor),
    ))
}

fn offset(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let factor = required_number(&args, "factor")?;
    let label = format_number(factor);
    Ok(map_present(
        args.series("seriesList"),
        |s| format!("offset({},{})", s.name, label),
        |v| Some(v + factor),
    ))
}

fn absolute(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    Ok(map_present(
        args.series("seriesList"),
        |s| format!("absolute({})", s.name),
        |v| Some(v.abs()),
    ))
}

fn invert(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    Ok(map_present(
        args.series("seriesList"),
        |s| format!("invert({})", s.name),
        |v| (v != 0.0).then(|| 1.0 / v),
    ))
}

fn alias(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let new_name = args.text("newName").unwrap_or_default().to_string();
    Ok(args
        .series("seriesList")
        .into_iter()
        .map(|mut s| {
            s.name = new_name.clone();
            s
        })
        .collect())
}

/// The metric path inside a possibly wrapped name: `scale(a.b.c,2)` -> `a.b.c`
fn metric_path(name: &str) -> &str {
    let inner = name.rsplit('(').next().unwrap_or(name);
    inner.split([',', ')']).next().unwrap_or(inner)
}

fn alias_by_node(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let nodes = args.numbers("nodes");
    if nodes.is_empty() {
        return Err(args.invalid("at least one node index is required"));
    }

    let mut out = Vec::new();
    for mut series in args.series("seriesList") {
        let parts: Vec<&str> = metric_path(&series.name).split('.').collect();
        let mut picked = Vec::with_capacity(nodes.len());
        for &node in &nodes {
            let idx = node as i64;
            let resolved = if idx < 0 { parts.len() as i64 + idx } else { idx };
            let part = usize::try_from(resolved)
                .ok()
                .and_then(|i| parts.get(i))
                .ok_or_else(|| {
                    args.invalid(format!("node {} out of range for '{}'", idx, series.name))
                })?;
            picked.push(*part);
        }
        series.name = picked.join(".");
        out.push(series);
    }
    Ok(out)
}

fn alias_sub(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let search = args.text("search").unwrap_or_default();
    let regex = Regex::new(search).map_err(|e| args.invalid(format!("invalid regex: {}", e)))?;
    // Accept \1 style back-references
    let backref = Regex::new(r"\\(\d+)").map_err(|e| args.invalid(e.to_string()))?;
    let replace = backref
        .replace_all(args.text("replace").unwrap_or_default(), "$${$1}")
        .into_owned();

    Ok(args
        .series("seriesList")
        .into_iter()
        .map(|mut s| {
            s.name = regex.replace_all(&s.name, replace.as_str()).into_owned();
            s
        })
        .collect())
}

fn derivative(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    Ok(args
        .series("seriesList")
        .iter()
        .map(|s| {
            let mut prev: Option<f64> = None;
            let values = s
                .values
                .iter()
                .map(|&v| {
                    let out = match (prev, v) {
                        (Some(p), Some(v)) => Some(v - p),
                        _ => None,
                    };
                    prev = v;
                    out
                })
                .collect();
            s.derive(format!("derivative({})", s.name), values)
        })
        .collect())
}

fn non_negative_derivative(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let max_value = args.number("maxValue");
    Ok(args
        .series("seriesList")
        .iter()
        .map(|s| {
            let mut prev: Option<f64> = None;
            let values = s
                .values
                .iter()
                .map(|&v| {
                    let out = match (prev, v) {
                        (Some(p), Some(v)) if v >= p => Some(v - p),
                        // Counter wrapped
                        (Some(p), Some(v)) => match max_value {
                            Some(max) if max >= v => Some((max - p) + v + 1.0),
                            _ => None,
                        },
                        _ => None,
                    };
                    prev = v;
                    out
                })
                .collect();
            s.derive(format!("nonNegativeDerivative({})", s.name), values)
        })
        .collect())
}

fn integral(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    Ok(args
        .series("seriesList")
        .iter()
        .map(|s| {
            let mut total = 0.0;
            let values = s
                .values
                .iter()
                .map(|v| {
                    v.map(|v| {
                        total += v;
                        total
                    })
                })
                .collect();
            s.derive(format!("integral({})", s.name), values)
        })
        .collect())
}

fn moving_average(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let (label, window) = match args.value("windowSize") {
        Some(Value::Number(n)) if *n >= 1.0 => (format_number(*n), Window::Points(*n as usize)),
        Some(Value::Text(text)) => {
            let seconds = interval_seconds(text)
                .filter(|s| *s > 0)
                .ok_or_else(|| args.invalid(format!("invalid window size '{}'", text)))?;
            (format!("\"{}\"", text), Window::Seconds(seconds))
        }
        _ => return Err(args.invalid("windowSize must be a positive number or an interval")),
    };

    Ok(args
        .series("seriesList")
        .iter()
        .map(|s| {
            let points = match window {
                Window::Points(n) => n,
                Window::Seconds(secs) => ((secs / s.step) as usize).max(1),
            };
            let values = (0..s.len())
                .map(|i| {
                    let from = (i + 1).saturating_sub(points);
                    Consolidation::Average.apply(&s.values[from..=i])
                })
                .collect();
            s.derive(format!("movingAverage({},{})", s.name, label), values)
        })
        .collect())
}

#[derive(Clone, Copy)]
enum Window {
    Points(usize),
    Seconds(i64),
}

fn transform_null(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let default = args.number("default").unwrap_or(0.0);
    let label = format_number(default);
    Ok(args
        .series("seriesList")
        .iter()
        .map(|s| {
            let values = s.values.iter().map(|v| Some(v.unwrap_or(default))).collect();
            s.derive(format!("transformNull({},{})", s.name, label), values)
        })
        .collect())
}

fn keep_last_value(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let limit = args.count("limit")?.unwrap_or(usize::MAX);
    Ok(args
        .series("seriesList")
        .iter()
        .map(|s| {
            let values = fill_gaps(&s.values, limit);
            s.derive(format!("keepLastValue({})", s.name), values)
        })
        .collect())
}

/// Repeat the last present value over gaps of at most `limit` samples
fn fill_gaps(values: &[Option<f64>], limit: usize) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    let mut last: Option<f64> = None;
    let mut gap_start = 0;

    for i in 0..=values.len() {
        let current = values.get(i).copied().flatten();
        let at_end = i == values.len();
        if current.is_some() || at_end {
            let gap = i - gap_start;
            if let Some(fill) = last {
                if gap > 0 && gap <= limit {
                    out[gap_start..i].iter_mut().for_each(|v| *v = Some(fill));
                }
            }
            if current.is_some() {
                last = current;
            }
            gap_start = i + 1;
        }
    }
    out
}

fn consolidate_by(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let func = args.text("consolidationFunc").unwrap_or_default();
    let consolidation = Consolidation::from_name(func).ok_or_else(|| {
        args.invalid(format!(
            "invalid consolidation function '{}', must be one of sum, average, max, min, last",
            func
        ))
    })?;

    Ok(args
        .series("seriesList")
        .iter()
        .map(|s| {
            s.derive(
                format!("consolidateBy({},\"{}\")", s.name, consolidation),
                s.values.clone(),
            )
            .with_consolidation(consolidation)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, series};
    use super::super::Value;
    use super::*;
    use crate::query::error::QueryError;

    fn one(name: &str, values: &[Option<f64>]) -> Value {
        Value::SeriesList(vec![series(name, values)])
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_scale_and_offset() {
        let out = call("scale", vec![one("a.b", &[Some(2.0), None]), Value::Number(0.5)]).unwrap();
        assert_eq!(out[0].values, vec![Some(1.0), None]);
        assert_eq!(out[0].name, "scale(a.b,0.5)");
        assert_eq!(out[0].path_expression, "scale(a.b,0.5)");

        let out = call("offset", vec![one("a.b", &[Some(2.0)]), Value::Number(-3.0)]).unwrap();
        assert_eq!(out[0].values, vec![Some(-1.0)]);
        assert_eq!(out[0].name, "offset(a.b,-3)");
    }

    #[test]
    fn test_absolute_and_invert() {
        let out = call("absolute", vec![one("a", &[Some(-2.0), None])]).unwrap();
        assert_eq!(out[0].values, vec![Some(2.0), None]);

        let out = call("invert", vec![one("a", &[Some(4.0), Some(0.0)])]).unwrap();
        assert_eq!(out[0].values, vec![Some(0.25), None]);
        assert_eq!(out[0].name, "invert(a)");
    }

    #[test]
    fn test_alias_keeps_path_expression() {
        let out = call("alias", vec![one("a.b", &[Some(1.0)]), text("web")]).unwrap();
        assert_eq!(out[0].name, "web");
        assert_eq!(out[0].path_expression, "a.b");
    }

    #[test]
    fn test_alias_by_node() {
        let out = call(
            "aliasByNode",
            vec![one("scale(hosts.web1.cpu,2)", &[]), Value::Number(1.0), Value::Number(-1.0)],
        )
        .unwrap();
        assert_eq!(out[0].name, "web1.cpu");

        let err = call("aliasByNode", vec![one("a.b", &[]), Value::Number(5.0)]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArguments { .. }));
    }

    #[test]
    fn test_alias_sub() {
        let out = call(
            "aliasSub",
            vec![one("hosts.web1.cpu", &[]), text(r"hosts\.(\w+)\.cpu"), text(r"\1 cpu")],
        )
        .unwrap();
        assert_eq!(out[0].name, "web1 cpu");

        let err = call("aliasSub", vec![one("a", &[]), text("("), text("")]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArguments { .. }));
    }

    #[test]
    fn test_derivatives() {
        let out = call("derivative", vec![one("a", &[Some(1.0), Some(3.0), None, Some(4.0), Some(2.0)])]).unwrap();
        assert_eq!(out[0].values, vec![None, Some(2.0), None, None, Some(-2.0)]);
        assert_eq!(out[0].name, "derivative(a)");

        let counter = || one("c", &[Some(250.0), Some(255.0), Some(3.0)]);
        let out = call("nonNegativeDerivative", vec![counter()]).unwrap();
        assert_eq!(out[0].values, vec![None, Some(5.0), None]);

        let out = call("nonNegativeDerivative", vec![counter(), Value::Number(255.0)]).unwrap();
        assert_eq!(out[0].values, vec![None, Some(5.0), Some(4.0)]);
    }

    #[test]
    fn test_integral() {
        let out = call("integral", vec![one("a", &[Some(1.0), None, Some(2.0)])]).unwrap();
        assert_eq!(out[0].values, vec![Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn test_moving_average() {
        let values = [Some(1.0), Some(3.0), None, Some(5.0)];
        let out = call("movingAverage", vec![one("a", &values), Value::Number(2.0)]).unwrap();
        assert_eq!(out[0].values, vec![Some(1.0), Some(2.0), Some(3.0), Some(5.0)]);
        assert_eq!(out[0].name, "movingAverage(a,2)");

        // 60s steps, so two minutes is two points
        let out = call("movingAverage", vec![one("a", &values), text("2min")]).unwrap();
        assert_eq!(out[0].values, vec![Some(1.0), Some(2.0), Some(3.0), Some(5.0)]);
        assert_eq!(out[0].name, "movingAverage(a,\"2min\")");

        let err = call("movingAverage", vec![one("a", &values), Value::Number(0.0)]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArguments { .. }));
    }

    #[test]
    fn test_transform_null() {
        let out = call("transformNull", vec![one("a", &[None, Some(2.0)])]).unwrap();
        assert_eq!(out[0].values, vec![Some(0.0), Some(2.0)]);
        assert_eq!(out[0].name, "transformNull(a,0)");
    }

    #[test]
    fn test_keep_last_value() {
        assert_eq!(
            fill_gaps(&[None, Some(1.0), None, None, Some(2.0), None], usize::MAX),
            vec![None, Some(1.0), Some(1.0), Some(1.0), Some(2.0), Some(2.0)]
        );
        assert_eq!(
            fill_gaps(&[Some(1.0), None, None, Some(2.0), None], 1),
            vec![Some(1.0), None, None, Some(2.0), Some(2.0)]
        );

        let out = call("keepLastValue", vec![one("a", &[Some(1.0), None])]).unwrap();
        assert_eq!(out[0].values, vec![Some(1.0), Some(1.0)]);
        assert_eq!(out[0].name, "keepLastValue(a)");
    }

    #[test]
    fn test_consolidate_by() {
        let out = call("consolidateBy", vec![one("a", &[Some(1.0)]), text("max")]).unwrap();
        assert_eq!(out[0].consolidation, Consolidation::Max);
        assert_eq!(out[0].name, "consolidateBy(a,\"max\")");

        let err = call("consolidateBy", vec![one("a", &[]), text("median")]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArguments { .. }));
    }
}
