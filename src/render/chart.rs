//! Chart renderer seam
//!
//! Image output is drawn by an external collaborator. The server only
//! validates the graph type and passes every other display option through.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

use crate::render::{OutputFormat, RenderResult};
use crate::store::TimeSeries;

/// Chart layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GraphType {
    #[default]
    Line,
    Pie,
}

impl GraphType {
    pub const NAMES: [&'static str; 2] = ["line", "pie"];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "line" => Some(GraphType::Line),
            "pie" => Some(GraphType::Pie),
            _ => None,
        }
    }
}

impl fmt::Display for GraphType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphType::Line => f.write_str("line"),
            GraphType::Pie => f.write_str("pie"),
        }
    }
}

/// Display options handed to a [`ChartRenderer`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartOptions {
    pub graph_type: GraphType,
    /// Request timezone name, for axis labels
    pub tz: String,
    /// Every request parameter the server did not interpret (colors, axis
    /// limits, width, height, ...)
    pub passthrough: BTreeMap<String, String>,
}

/// Draws series into an image format
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Formats this renderer can draw
    fn supports(&self, format: OutputFormat) -> bool;

    /// Draw `series`; only called for formats where `supports` is true
    async fn render(
        &self,
        format: OutputFormat,
        series: &[TimeSeries],
        options: &ChartOptions,
    ) -> RenderResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_type() {
        assert_eq!(GraphType::parse("pie"), Some(GraphType::Pie));
        assert_eq!(GraphType::parse("foo"), None);
        assert_eq!(GraphType::default().to_string(), "line");
    }
}
