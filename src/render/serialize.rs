//! Data format serializers
//!
//! | format     | body                                                    |
//! |------------|---------------------------------------------------------|
//! | `json`     | `[{"target": name, "datapoints": [[value, ts], ...]}]`  |
//! | `raw`      | `name,start,end,step\|v1,v2,...` per line, `None` absent |
//! | `csv`      | `name,YYYY-MM-DD HH:MM:SS,value` rows, empty absent      |
//! | `dygraph`  | `{"labels": [...], "data": [[ts_ms, v1, v2, ...]]}`     |
//! | `rickshaw` | `[{"target": name, "datapoints": [{"x": ts, "y": v}]}]` |

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::render::{OutputFormat, RenderError, RenderResult};
use crate::store::TimeSeries;

/// Options affecting data serialization
#[derive(Debug, Clone)]
pub struct SerializeOptions {
    /// Drop absent points from json output
    pub no_null_points: bool,
    /// Timezone for csv timestamps
    pub tz: Tz,
    /// Wrap json bodies as `callback(...)`
    pub jsonp: Option<String>,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            no_null_points: false,
            tz: Tz::UTC,
            jsonp: None,
        }
    }
}

/// A serialized response body
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Rendered {
    /// Body as text, for tests and the CLI
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Serialize series into a data format
///
/// Image formats are rejected with [`RenderError::Unsupported`]; they go
/// through a [`ChartRenderer`](crate::render::ChartRenderer) instead.
pub fn serialize(format: OutputFormat, series: &[TimeSeries], options: &SerializeOptions) -> RenderResult<Rendered> {
    let body = match format {
        OutputFormat::Json => serde_json::to_vec(&json_body(series, options.no_null_points))?,
        OutputFormat::Dygraph => serde_json::to_vec(&dygraph_body(series))?,
        OutputFormat::Rickshaw => serde_json::to_vec(&rickshaw_body(series))?,
        OutputFormat::Raw => raw_body(series).into_bytes(),
        OutputFormat::Csv => csv_body(series, options.tz)?,
        OutputFormat::Svg | OutputFormat::Png | OutputFormat::Pdf => {
            return Err(RenderError::Unsupported(format))
        }
    };

    match &options.jsonp {
        Some(callback) if format.is_json() => {
            if !is_valid_callback(callback) {
                return Err(RenderError::InvalidCallback(callback.clone()));
            }
            let mut wrapped = Vec::with_capacity(body.len() + callback.len() + 2);
            wrapped.extend_from_slice(callback.as_bytes());
            wrapped.push(b'(');
            wrapped.extend_from_slice(&body);
            wrapped.push(b')');
            Ok(Rendered {
                content_type: "text/javascript",
                body: wrapped,
            })
        }
        _ => Ok(Rendered {
            content_type: format.content_type(),
            body,
        }),
    }
}

/// A jsonp callback is a dotted JavaScript name: `[A-Za-z_$][A-Za-z0-9_$.]*`
pub fn is_valid_callback(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'))
}

/// Non-finite samples are written as absent
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Shortest round-trip rendering of a sample
fn sample_text(value: f64) -> String {
    format!("{:?}", value)
}

#[derive(Serialize)]
struct JsonSeries<'a> {
    target: &'a str,
    datapoints: Vec<(Option<f64>, i64)>,
}

fn json_body(series: &[TimeSeries], no_null_points: bool) -> Vec<JsonSeries<'_>> {
    series
        .iter()
        .filter_map(|s| {
            let datapoints: Vec<_> = s
                .points()
                .map(|(ts, v)| (finite(v), ts))
                .filter(|(v, _)| !no_null_points || v.is_some())
                .collect();
            if no_null_points && datapoints.is_empty() {
                return None;
            }
            Some(JsonSeries {
                target: &s.name,
                datapoints,
            })
        })
        .collect()
}

#[derive(Serialize)]
struct RickshawPoint {
    x: i64,
    y: Option<f64>,
}

#[derive(Serialize)]
struct RickshawSeries<'a> {
    target: &'a str,
    datapoints: Vec<RickshawPoint>,
}

fn rickshaw_body(series: &[TimeSeries]) -> Vec<RickshawSeries<'_>> {
    series
        .iter()
        .map(|s| RickshawSeries {
            target: &s.name,
            datapoints: s
                .points()
                .map(|(x, y)| RickshawPoint { x, y: finite(y) })
                .collect(),
        })
        .collect()
}

/// Rows follow the first series' grid; other series are read by index
fn dygraph_body(series: &[TimeSeries]) -> serde_json::Value {
    let Some(first) = series.first() else {
        return serde_json::json!({});
    };

    let labels: Vec<&str> = std::iter::once("Time")
        .chain(series.iter().map(|s| s.name.as_str()))
        .collect();

    let data: Vec<Vec<serde_json::Value>> = (0..first.len())
        .map(|i| {
            let mut row = Vec::with_capacity(series.len() + 1);
            row.push(serde_json::Value::from(first.timestamp_at(i) * 1000));
            for s in series {
                let value = finite(s.values.get(i).copied().flatten());
                row.push(value.map_or(serde_json::Value::Null, serde_json::Value::from));
            }
            row
        })
        .collect();

    serde_json::json!({ "labels": labels, "data": data })
}

fn raw_body(series: &[TimeSeries]) -> String {
    let mut out = String::new();
    for s in series {
        let values: Vec<String> = s
            .values
            .iter()
            .map(|v| v.map_or_else(|| "None".to_string(), sample_text))
            .collect();
        out.push_str(&format!(
            "{},{},{},{}|{}\n",
            s.name,
            s.start,
            s.end,
            s.step,
            values.join(",")
        ));
    }
    out
}

fn csv_body(series: &[TimeSeries], tz: Tz) -> RenderResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());

    for s in series {
        for (ts, value) in s.points() {
            let timestamp = DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| ts.to_string());
            let value = value.map(sample_text).unwrap_or_default();
            writer.write_record([s.name.as_str(), timestamp.as_str(), value.as_str()])?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| RenderError::Csv(e.into_error().into()))
}
