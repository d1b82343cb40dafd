//! scalarlog-core: category router and schema-migrating CSV writer.
//!
//! Metrics named `"category/metric"` are grouped by category; each category
//! gets its own `<base_dir>/<job>/<category>/log.csv`. When a metric name
//! shows up that a file has never seen, the file is rewritten with the new
//! column appended, so the header always describes every row.

pub mod engine;
pub mod error;
pub mod logger;
pub mod models;
pub mod router;
pub mod storage;
pub mod writer;

pub use engine::LoggingEngine;
pub use error::{Result, ScalarlogError};
pub use logger::MetricsLogger;
pub use models::{LoggerConfig, MetricValue, Record, RunMode};
pub use router::{route, Router};
pub use writer::{CategoryFile, TabularWriter};
