//! Combiners
//!
//! Reduce many series to one per timestamp. Inputs are aligned onto a common
//! step first; a combiner given no series returns none.

use crate::query::align::align;
use crate::query::error::QueryResult;
use crate::query::functions::{
    combined_name, Args, CallContext, FunctionKind, FunctionRegistry, FunctionSpec, Param,
};
use crate::store::TimeSeries;

pub(super) fn register(registry: &mut FunctionRegistry) {
    let reducers: [(&'static str, Option<&'static str>, fn(&[Option<f64>]) -> Option<f64>); 8] = [
        ("sumSeries", Some("sum"), sum),
        ("averageSeries", Some("avg"), average),
        ("minSeries", None, min),
        ("maxSeries", None, max),
        ("diffSeries", None, diff),
        ("multiplySeries", None, multiply),
        ("rangeOfSeries", None, range),
        ("countSeries", None, count),
    ];

    for (name, alias, reducer) in reducers {
        let imp = move |mut args: Args, _: &CallContext| -> QueryResult<Vec<TimeSeries>> {
            let series = args.series("seriesLists");
            Ok(combine(name, &series, reducer))
        };
        let mut spec = FunctionSpec::new(name, FunctionKind::Combiner, imp)
            .param(Param::series("seriesLists").optional().variadic());
        if let Some(alias) = alias {
            spec = spec.alias(alias);
        }
        registry.register(spec);
    }

    registry.register(
        FunctionSpec::new("divideSeries", FunctionKind::Combiner, divide_series)
            .param(Param::series("dividendSeriesList"))
            .param(Param::series("divisorSeries")),
    );
}

/// Align `series` and reduce each timestamp with `reducer`
fn combine(
    name: &str,
    series: &[TimeSeries],
    reducer: fn(&[Option<f64>]) -> Option<f64>,
) -> Vec<TimeSeries> {
    if series.is_empty() {
        return Vec::new();
    }

    let aligned = align(series);
    let len = aligned.series.first().map(|s| s.len()).unwrap_or(0);
    let mut column = Vec::with_capacity(aligned.series.len());

    let values = (0..len)
        .map(|i| {
            column.clear();
            column.extend(aligned.series.iter().map(|s| s.values[i]));
            reducer(&column)
        })
        .collect();

    vec![TimeSeries::new(combined_name(name, series), aligned.start, aligned.step, values)]
}

fn present(values: &[Option<f64>]) -> impl Iterator<Item = f64> + '_ {
    values.iter().flatten().copied()
}

fn sum(values: &[Option<f64>]) -> Option<f64> {
    let mut present = present(values).peekable();
    present.peek()?;
    Some(present.sum())
}

fn average(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = present(values).collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

fn min(values: &[Option<f64>]) -> Option<f64> {
    present(values).reduce(f64::min)
}

fn max(values: &[Option<f64>]) -> Option<f64> {
    present(values).reduce(f64::max)
}

/// First minus the rest; absent counts as zero unless everything is absent
fn diff(values: &[Option<f64>]) -> Option<f64> {
    present(values).next()?;
    let (first, rest) = values.split_first()?;
    Some(first.unwrap_or(0.0) - present(rest).sum::<f64>())
}

/// Product; any absent sample makes the product absent
fn multiply(values: &[Option<f64>]) -> Option<f64> {
    values.iter().copied().product::<Option<f64>>()
}

fn range(values: &[Option<f64>]) -> Option<f64> {
    Some(max(values)? - min(values)?)
}

fn count(values: &[Option<f64>]) -> Option<f64> {
    Some(values.len() as f64)
}

/// Divide every dividend by the single divisor series
fn divide_series(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let dividends = args.series("dividendSeriesList");
    let divisors = args.series("divisorSeries");

    let divisor = match divisors.as_slice() {
        [divisor] => divisor,
        other => {
            return Err(args.invalid(format!(
                "divisorSeries must be exactly one series, got {}",
                other.len()
            )))
        }
    };

    Ok(dividends
        .iter()
        .map(|dividend| {
            let aligned = align(&[dividend.clone(), divisor.clone()]);
            let (a, b) = (&aligned.series[0], &aligned.series[1]);
            let values = a
                .values
                .iter()
                .zip(&b.values)
                .map(|(x, y)| match (x, y) {
                    (Some(x), Some(y)) if *y != 0.0 => Some(x / y),
                    _ => None,
                })
                .collect();
            let name = format!("divideSeries({},{})", dividend.name, divisor.name);
            TimeSeries::new(name, aligned.start, aligned.step, values)
        })
        .collect())
}
