//! Selectors
//!
//! Pick, drop or reorder whole series without touching their samples.

use regex::Regex;
use std::cmp::Ordering;

use crate::query::error::QueryResult;
use crate::query::functions::{Args, CallContext, FunctionKind, FunctionRegistry, FunctionSpec, Param};
use crate::store::TimeSeries;

pub(super) fn register(registry: &mut FunctionRegistry) {
    use FunctionKind::Transformer;

    registry.register(
        FunctionSpec::new("sortByName", Transformer, sort_by_name)
            .param(Param::series("seriesList"))
            .param(Param::boolean("reverse").optional()),
    );
    registry.register(FunctionSpec::new("sortByMaxima", Transformer, sort_by_maxima).param(Param::series("seriesList")));
    registry.register(
        FunctionSpec::new("limit", Transformer, limit)
            .param(Param::series("seriesList"))
            .param(Param::number("n")),
    );
    registry.register(
        FunctionSpec::new("highestMax", Transformer, highest_max)
            .param(Param::series("seriesList"))
            .param(Param::number("n").optional()),
    );
    registry.register(
        FunctionSpec::new("lowestAverage", Transformer, lowest_average)
            .param(Param::series("seriesList"))
            .param(Param::number("n").optional()),
    );
    registry.register(
        FunctionSpec::new("exclude", Transformer, exclude)
            .param(Param::series("seriesList"))
            .param(Param::text("pattern")),
    );
    registry.register(
        FunctionSpec::new("grep", Transformer, grep)
            .param(Param::series("seriesList"))
            .param(Param::text("pattern")),
    );
    registry.register(
        FunctionSpec::new("group", Transformer, group).param(Param::series("seriesLists").optional().variadic()),
    );
    registry.register(
        FunctionSpec::new("areaBetween", Transformer, area_between).param(Param::series("seriesLists").variadic()),
    );
}

fn max_of(series: &TimeSeries) -> Option<f64> {
    series.present_values().reduce(f64::max)
}

fn average_of(series: &TimeSeries) -> Option<f64> {
    let count = series.present_count();
    (count > 0).then(|| series.present_values().sum::<f64>() / count as f64)
}

/// Order by a statistic; series without one sort last either way
fn by_stat(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn sort_by_name(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let reverse = args.boolean("reverse").unwrap_or(false);
    let mut series = args.series("seriesList");
    series.sort_by(|a, b| a.name.cmp(&b.name));
    if reverse {
        series.reverse();
    }
    Ok(series)
}

fn sort_by_maxima(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let mut series = args.series("seriesList");
    series.sort_by(|a, b| by_stat(max_of(a), max_of(b), true));
    Ok(series)
}

fn limit(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let n = args.count("n")?.unwrap_or(0);
    let mut series = args.series("seriesList");
    series.truncate(n);
    Ok(series)
}

fn highest_max(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let n = args.count("n")?.unwrap_or(1);
    let mut series = args.series("seriesList");
    series.sort_by(|a, b| by_stat(max_of(a), max_of(b), true));
    series.truncate(n);
    Ok(series)
}

fn lowest_average(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let n = args.count("n")?.unwrap_or(1);
    let mut series = args.series("seriesList");
    series.sort_by(|a, b| by_stat(average_of(a), average_of(b), false));
    series.truncate(n);
    Ok(series)
}

fn name_filter(mut args: Args, keep_matching: bool) -> QueryResult<Vec<TimeSeries>> {
    let pattern = args.text("pattern").unwrap_or_default();
    let regex = Regex::new(pattern).map_err(|e| args.invalid(format!("invalid regex: {}", e)))?;
    Ok(args
        .series("seriesList")
        .into_iter()
        .filter(|s| regex.is_match(&s.name) == keep_matching)
        .collect())
}

fn exclude(args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    name_filter(args, false)
}

fn grep(args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    name_filter(args, true)
}

fn group(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    Ok(args.series("seriesLists"))
}

/// Mark the band between exactly two series
fn area_between(mut args: Args, _: &CallContext) -> QueryResult<Vec<TimeSeries>> {
    let series = args.series("seriesLists");
    if series.len() != 2 {
        return Err(args.invalid(format!("expected exactly two series, got {}", series.len())));
    }
    Ok(series
        .into_iter()
        .map(|mut s| {
            s.name = format!("areaBetween({})", s.name);
            s
        })
        .collect())
}
