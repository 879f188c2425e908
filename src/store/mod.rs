//! Metric Store
//!
//! This module resolves dotted metric paths across pluggable backends:
//!
//! - **types**: Core data structures (Node, TimeSeries, Consolidation)
//! - **matcher**: Glob matching over dotted paths
//! - **finder**: The backend trait every storage source implements
//! - **memory**, **csv_finder**, **remote**: Bundled finders
//! - **engine**: The store that fans out to all finders
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Find Path:
//!   Pattern → compile → every Finder (concurrently) → dedupe → sort
//!
//! Fetch Path:
//!   Leaf → Finders that reported it → most present samples wins
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use graphite_render::store::{MemoryFinder, Store, StoreConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let finder = MemoryFinder::new("memory")
//!         .with_series("hosts.web1.cpu", 60, &[(1_700_000_040, Some(12.5))]);
//!     let store = Store::new(vec![Arc::new(finder)], StoreConfig::default());
//!
//!     let nodes = store.find("hosts.*.cpu").await?;
//!     let series = store.fetch_node(&nodes[0], 1_700_000_000, 1_700_000_300).await;
//!     println!("{} has {} samples", series.name, series.len());
//!
//!     Ok(())
//! }
//! ```

pub mod csv_finder;
pub mod engine;
pub mod error;
pub mod finder;
pub mod matcher;
pub mod memory;
pub mod remote;
pub mod types;

// Re-export commonly used types
pub use csv_finder::CsvFinder;
pub use engine::{LeafConflictPolicy, Store, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use finder::{archive_window, sample_points, Finder};
pub use matcher::{matches, PathMatcher};
pub use memory::MemoryFinder;
pub use remote::RemoteFinder;
pub use types::{Consolidation, Node, TimeSeries};
