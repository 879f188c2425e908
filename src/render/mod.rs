//! Output Rendering
//!
//! Turns evaluated series into response bodies:
//!
//! - **Data formats** (`json`, `raw`, `csv`, `dygraph`, `rickshaw`) are
//!   serialized here, see [`serialize`]
//! - **Image formats** (`svg`, `png`, `pdf`) are delegated to a
//!   [`ChartRenderer`], which receives the series and the display options
//!   untouched
//!
//! ```rust,ignore
//! use graphite_render::render::{serialize, OutputFormat, SerializeOptions};
//!
//! let rendered = serialize(OutputFormat::Json, &series, &SerializeOptions::default())?;
//! assert_eq!(rendered.content_type, "application/json");
//! ```

pub mod chart;
pub mod serialize;

pub use chart::{ChartOptions, ChartRenderer, GraphType};
pub use serialize::{is_valid_callback, serialize, Rendered, SerializeOptions};

use std::fmt;
use thiserror::Error;

/// Response formats accepted by `/render`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Json,
    Raw,
    Csv,
    Dygraph,
    Rickshaw,
    Svg,
    Png,
    Pdf,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 8] = [
        OutputFormat::Json,
        OutputFormat::Raw,
        OutputFormat::Csv,
        OutputFormat::Dygraph,
        OutputFormat::Rickshaw,
        OutputFormat::Svg,
        OutputFormat::Png,
        OutputFormat::Pdf,
    ];

    /// Parse a format name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(name))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Raw => "raw",
            OutputFormat::Csv => "csv",
            OutputFormat::Dygraph => "dygraph",
            OutputFormat::Rickshaw => "rickshaw",
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
            OutputFormat::Pdf => "pdf",
        }
    }

    /// Whether the format is drawn by a chart renderer
    pub fn is_image(&self) -> bool {
        matches!(self, OutputFormat::Svg | OutputFormat::Png | OutputFormat::Pdf)
    }

    /// Whether `jsonp` wrapping applies
    pub fn is_json(&self) -> bool {
        matches!(
            self,
            OutputFormat::Json | OutputFormat::Dygraph | OutputFormat::Rickshaw
        )
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Json | OutputFormat::Dygraph | OutputFormat::Rickshaw => "application/json",
            OutputFormat::Raw => "text/plain",
            OutputFormat::Csv => "text/csv",
            OutputFormat::Svg => "image/svg+xml",
            OutputFormat::Png => "image/png",
            OutputFormat::Pdf => "application/x-pdf",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Png
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// No renderer is configured for this format
    #[error("Format '{0}' is not supported by this server")]
    Unsupported(OutputFormat),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),

    /// jsonp callback is not a plain JavaScript name
    #[error("Invalid jsonp callback '{0}'.")]
    InvalidCallback(String),

    /// Chart renderer failure
    #[error("Chart error: {0}")]
    Chart(String),
}

pub type RenderResult<T> = Result<T, RenderError>;
