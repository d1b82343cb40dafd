//! Per-category CSV metrics logger with dynamic column schemas.
//!
//! ```no_run
//! use scalarlog::{LoggerConfig, MetricsLogger, RunMode};
//!
//! # fn main() -> scalarlog::Result<()> {
//! let config = LoggerConfig::new("resnet_cifar10", "./logs").with_mode(RunMode::FreshStart);
//! let mut logger = MetricsLogger::new(config)?;
//! logger.log([("loss", 0.52), ("val/acc", 0.81)], 0)?;
//! logger.log([("loss", 0.47), ("lr", 0.01)], 1)?;
//! logger.close()?;
//! # Ok(())
//! # }
//! ```

pub use scalarlog_core::*;
