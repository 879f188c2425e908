//! Data Transfer Objects
//!
//! Request parsing and validation for the API endpoints, plus the JSON
//! response shapes. `/render` parameters arrive as repeated key/value pairs
//! (query string or form body) and are validated all at once, so a response
//! reports every bad field together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::error::FieldErrors;
use crate::query::{
    resolve_time, Evaluator, Expr, QueryError, TemplateArgs, TemplateValue, TimeRangeResolver,
    TimeWindow,
};
use crate::render::{is_valid_callback, ChartOptions, GraphType, OutputFormat, SerializeOptions};

const REQUIRED: &str = "This parameter is required.";
const NOT_AN_INTEGER: &str = "Must be an integer.";

// ============================================
// RENDER
// ============================================

/// A validated `/render` request
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Targets as sent, in request order
    pub targets: Vec<String>,
    /// Parsed targets, after template expansion
    pub exprs: Vec<Expr>,
    pub window: TimeWindow,
    pub format: OutputFormat,
    pub max_data_points: Option<usize>,
    pub no_null_points: bool,
    pub jsonp: Option<String>,
    /// Request-level `template[key]` bindings
    pub template_args: TemplateArgs,
    /// Accepted for compatibility; nothing is cached
    pub no_cache: bool,
    pub cache_timeout: Option<u64>,
    pub chart: ChartOptions,
}

impl RenderRequest {
    /// Validate raw request pairs
    ///
    /// Returns every invalid field with its message.
    pub fn from_pairs(
        pairs: &[(String, String)],
        resolver: &TimeRangeResolver,
        now: DateTime<Utc>,
    ) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut targets = Vec::new();
        let mut template_args = TemplateArgs::new();
        let mut passthrough = std::collections::BTreeMap::new();

        let mut from = None;
        let mut until = None;
        let mut tz = None;
        let mut format_name = None;
        let mut raw_data = false;
        let mut max_points = None;
        let mut no_null_points = false;
        let mut jsonp = None;
        let mut no_cache = false;
        let mut cache_timeout = None;
        let mut graph_type_name = None;

        for (key, value) in pairs {
            match key.as_str() {
                "target" | "target[]" => {
                    if !value.trim().is_empty() {
                        targets.push(value.clone());
                    }
                }
                "from" => from = Some(value.as_str()),
                "until" => until = Some(value.as_str()),
                "tz" => tz = Some(value.as_str()),
                "format" => format_name = Some(value.as_str()),
                "rawData" => raw_data = is_true(value),
                "maxDataPoints" => max_points = Some(value.as_str()),
                "noNullPoints" => no_null_points = is_true(value),
                "jsonp" => jsonp = Some(value.clone()).filter(|v| !v.is_empty()),
                "noCache" => no_cache = is_true(value),
                "cacheTimeout" => cache_timeout = Some(value.as_str()),
                "graphType" => graph_type_name = Some(value.as_str()),
                _ => match template_key(key) {
                    Some(name) => {
                        template_args.insert(name.to_string(), TemplateValue::from_param(value));
                    }
                    None => {
                        passthrough.insert(key.clone(), value.clone());
                    }
                },
            }
        }

        if targets.is_empty() {
            errors.insert("target".into(), REQUIRED.into());
        }

        let format = match (raw_data, format_name) {
            (true, _) => OutputFormat::Raw,
            (false, None) => OutputFormat::default(),
            (false, Some(name)) => OutputFormat::parse(name).unwrap_or_else(|| {
                errors.insert("format".into(), invalid_choice("format", name, &format_names()));
                OutputFormat::default()
            }),
        };

        let graph_type = match graph_type_name {
            None => GraphType::default(),
            Some(name) => match GraphType::parse(name) {
                Some(_) if !format.is_image() => {
                    errors.insert(
                        "graphType".into(),
                        format!("graphType is only valid for image formats, not '{}'.", format),
                    );
                    GraphType::default()
                }
                Some(graph_type) => graph_type,
                None => {
                    errors.insert(
                        "graphType".into(),
                        invalid_choice("graphType", name, &GraphType::NAMES),
                    );
                    GraphType::default()
                }
            },
        };

        let max_data_points = max_points.and_then(|raw| match parse_max_points(raw) {
            Ok(points) => Some(points),
            Err(message) => {
                errors.insert("maxDataPoints".into(), message.into());
                None
            }
        });

        let cache_timeout = cache_timeout.and_then(|raw| match raw.trim().parse::<u64>() {
            Ok(secs) => Some(secs),
            Err(_) => {
                errors.insert("cacheTimeout".into(), NOT_AN_INTEGER.into());
                None
            }
        });

        if let Some(callback) = jsonp.as_deref().filter(|cb| !is_valid_callback(cb)) {
            errors.insert("jsonp".into(), format!("Invalid jsonp callback '{}'.", callback));
        }

        let window = resolve_window(resolver, from, until, tz, now, &mut errors);

        let mut exprs = Vec::with_capacity(targets.len());
        for target in &targets {
            match Evaluator::prepare(target, &template_args) {
                Ok(expr) => exprs.push(expr),
                Err(QueryError::InvalidExpression { .. }) => {
                    errors
                        .entry("target".into())
                        .or_insert_with(|| format!("Invalid target: '{}'.", target));
                }
                Err(e) => {
                    errors.entry("target".into()).or_insert_with(|| e.to_string());
                }
            }
        }

        match window {
            Some(window) if errors.is_empty() => Ok(Self {
                chart: ChartOptions {
                    graph_type,
                    tz: window.tz.name().to_string(),
                    passthrough,
                },
                targets,
                exprs,
                window,
                format,
                max_data_points,
                no_null_points,
                jsonp,
                template_args,
                no_cache,
                cache_timeout,
            }),
            _ => Err(errors),
        }
    }

    /// Options for the data serializers
    pub fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions {
            no_null_points: self.no_null_points,
            tz: self.window.tz,
            jsonp: self.jsonp.clone(),
        }
    }
}

/// Resolve the window, recording failures against the fields they concern
fn resolve_window(
    resolver: &TimeRangeResolver,
    from: Option<&str>,
    until: Option<&str>,
    tz: Option<&str>,
    now: DateTime<Utc>,
    errors: &mut FieldErrors,
) -> Option<TimeWindow> {
    // A bad tz is reported, and from/until are still checked in the default zone
    let tz = match resolver.timezone(tz) {
        Ok(tz) => Some(tz),
        Err(e) => {
            errors.insert("tz".into(), e.to_string());
            None
        }
    };
    let zone = tz.unwrap_or_else(|| resolver.default_tz());

    let mut resolve = |field: &str, expr: Option<&str>| match resolve_time(field, expr.unwrap_or(""), zone, now) {
        Ok(ts) => Some(ts),
        Err(e) => {
            errors.insert(field.to_string(), e.to_string());
            None
        }
    };
    let from = resolve("from", from);
    let until = resolve("until", until);
    let (Some(from), Some(until), Some(tz)) = (from, until, tz) else {
        return None;
    };

    match TimeWindow::new(from, until, tz) {
        Ok(window) => Some(window),
        Err(e) => {
            errors.insert("from".into(), e.to_string());
            errors.insert("until".into(), e.to_string());
            None
        }
    }
}

/// `maxDataPoints` accepts integers and integer-valued floats, rounded to
/// the nearest integer with halves rounding down
fn parse_max_points(raw: &str) -> Result<usize, &'static str> {
    let value: f64 = raw.trim().parse().map_err(|_| NOT_AN_INTEGER)?;
    if !value.is_finite() {
        return Err(NOT_AN_INTEGER);
    }
    let rounded = (value - 0.5).ceil();
    if rounded < 1.0 {
        return Err("Must be a positive integer.");
    }
    Ok(rounded as usize)
}

/// `template[name]` -> `name`
fn template_key(key: &str) -> Option<&str> {
    key.strip_prefix("template[")
        .and_then(|rest| rest.strip_suffix(']'))
        .filter(|name| !name.is_empty())
}

fn is_true(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn format_names() -> Vec<&'static str> {
    OutputFormat::ALL.iter().map(|f| f.as_str()).collect()
}

fn invalid_choice(field: &str, value: &str, choices: &[&str]) -> String {
    let choices: Vec<String> = choices.iter().map(|c| format!("'{}'", c)).collect();
    format!(
        "Invalid {} '{}', must be one of {}.",
        field,
        value,
        choices.join(", ")
    )
}

// ============================================
// METRICS DTOs
// ============================================

/// `/metrics/find` parameters
#[derive(Debug, Deserialize)]
pub struct FindParams {
    pub query: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

/// One node in `treejson` output
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub allow_children: u8,
    pub expandable: u8,
    pub leaf: u8,
    pub id: String,
    pub text: String,
    pub context: serde_json::Map<String, serde_json::Value>,
}

/// `completer` output
#[derive(Debug, Serialize)]
pub struct CompleterResponse {
    pub metrics: Vec<CompleterEntry>,
}

#[derive(Debug, Serialize)]
pub struct CompleterEntry {
    /// Full path, with a trailing `.` for branches
    pub path: String,
    pub name: String,
    pub is_leaf: String,
}

/// `/metrics/expand` output
#[derive(Debug, Serialize)]
pub struct ExpandResponse {
    pub results: Vec<String>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub finders: Vec<String>,
    pub functions: usize,
    pub uptime_seconds: u64,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 2, 26, 12, 0, 0).unwrap()
    }

    fn validate(items: &[(&str, &str)]) -> Result<RenderRequest, FieldErrors> {
        RenderRequest::from_pairs(&pairs(items), &TimeRangeResolver::default(), now())
    }

    fn errors(items: &[(&str, &str)]) -> Vec<(String, String)> {
        validate(items).unwrap_err().into_iter().collect()
    }

    fn error(field: &str, message: &str) -> Vec<(String, String)> {
        vec![(field.to_string(), message.to_string())]
    }

    #[test]
    fn test_defaults() {
        let request = validate(&[("target", "a.b")]).unwrap();
        assert_eq!(request.format, OutputFormat::Png);
        assert_eq!(request.window.until, now().timestamp());
        assert_eq!(request.window.duration(), 86_400);
        assert_eq!(request.max_data_points, None);
        assert_eq!(request.exprs, vec![Expr::path("a.b")]);
    }

    #[test]
    fn test_target_required() {
        assert_eq!(errors(&[]), error("target", "This parameter is required."));
    }

    #[test]
    fn test_graph_type() {
        assert_eq!(
            errors(&[("graphType", "foo"), ("target", "test")]),
            error("graphType", "Invalid graphType 'foo', must be one of 'line', 'pie'.")
        );
        assert!(validate(&[("graphType", "pie"), ("target", "test")]).is_ok());
        assert!(errors(&[("graphType", "pie"), ("target", "test"), ("format", "json")])
            .iter()
            .any(|(field, _)| field == "graphType"));
    }

    #[test]
    fn test_max_data_points() {
        assert_eq!(
            errors(&[("maxDataPoints", "foo"), ("target", "test")]),
            error("maxDataPoints", "Must be an integer.")
        );
        let request = validate(&[("maxDataPoints", "5.5"), ("target", "test")]).unwrap();
        assert_eq!(request.max_data_points, Some(5));
        let request = validate(&[("maxDataPoints", "12"), ("target", "test")]).unwrap();
        assert_eq!(request.max_data_points, Some(12));
    }

    #[test]
    fn test_empty_time_range() {
        assert_eq!(
            errors(&[
                ("from", "21:2020140313"),
                ("until", "21:2020140313"),
                ("target", "test")
            ]),
            vec![
                ("from".to_string(), "Invalid empty time range".to_string()),
                ("until".to_string(), "Invalid empty time range".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_timezone() {
        assert_eq!(
            errors(&[("target", "foo"), ("tz", "Europe/Lausanne")]),
            error("tz", "Unknown timezone: 'Europe/Lausanne'.")
        );
    }

    fn fields(items: &[(&str, &str)]) -> Vec<String> {
        errors(items).into_iter().map(|(field, _)| field).collect()
    }

    #[test]
    fn test_time_fields_reported_together() {
        assert_eq!(
            fields(&[("target", "a.b"), ("from", "bogus"), ("until", "alsobogus")]),
            vec!["from", "until"]
        );
        assert_eq!(
            fields(&[("target", "a.b"), ("tz", "Nowhere/Land"), ("from", "bogus")]),
            vec!["from", "tz"]
        );
        assert_eq!(
            fields(&[("tz", "Nowhere/Land"), ("from", "bogus"), ("until", "-999999999999y")]),
            vec!["from", "target", "tz", "until"]
        );
    }

    #[test]
    fn test_jsonp_callback() {
        let request = validate(&[("target", "a.b"), ("format", "json"), ("jsonp", "jQuery.cb_1")]).unwrap();
        assert_eq!(request.jsonp.as_deref(), Some("jQuery.cb_1"));

        assert_eq!(
            errors(&[("target", "a.b"), ("format", "json"), ("jsonp", "alert(1);x")]),
            error("jsonp", "Invalid jsonp callback 'alert(1);x'.")
        );
    }

    #[test]
    fn test_invalid_target() {
        assert_eq!(
            errors(&[("target", "test:aa"), ("graphType", "pie")]),
            error("target", "Invalid target: 'test:aa'.")
        );
    }

    #[test]
    fn test_format_options() {
        let request = validate(&[("target", "a"), ("rawData", "true"), ("format", "json")]).unwrap();
        assert_eq!(request.format, OutputFormat::Raw);

        assert_eq!(
            errors(&[("target", "a"), ("format", "xml")]),
            error(
                "format",
                "Invalid format 'xml', must be one of 'json', 'raw', 'csv', 'dygraph', 'rickshaw', 'svg', 'png', 'pdf'."
            )
        );
    }

    #[test]
    fn test_template_and_passthrough() {
        let request = validate(&[
            ("target", "template(sumSeries(hosts.$1.cpu))"),
            ("template[1]", "worker*"),
            ("colorList", "red,blue"),
        ])
        .unwrap();

        assert_eq!(
            request.exprs[0],
            Expr::call("sumSeries", vec![Expr::path("hosts.worker*.cpu")])
        );
        assert_eq!(request.chart.passthrough.get("colorList").unwrap(), "red,blue");

        assert_eq!(
            errors(&[("target", "template(hosts.$1.cpu)")]),
            error("target", "Undefined template argument: $1")
        );
    }

    #[test]
    fn test_template_key() {
        assert_eq!(template_key("template[host]"), Some("host"));
        assert_eq!(template_key("template[]"), None);
        assert_eq!(template_key("templates"), None);
    }
}
