//! Synchronous metrics logger: routes each observation by category and
//! hands every category's slice to the tabular writer.

use tracing::{info, warn};

use crate::error::Result;
use crate::models::{LoggerConfig, MetricValue};
use crate::router::Router;
use crate::storage;
use crate::writer::{validate_category, CategoryFile, TabularWriter};

/// Per-job CSV logger.
///
/// Writes go straight to disk and are flushed after every row. The logger
/// is single-writer: methods take `&mut self`, so sharing one between
/// threads needs a lock or a [`crate::LoggingEngine`].
pub struct MetricsLogger {
    router: Router,
    writer: TabularWriter,
}

impl MetricsLogger {
    /// Create the job directory and an idle logger. Category files are
    /// created lazily on their first record.
    pub fn new(config: LoggerConfig) -> Result<Self> {
        let job_dir = config.job_dir();
        storage::ensure_dir(&job_dir)?;
        info!(
            job_dir = %job_dir.display(),
            mode = %config.mode,
            "MetricsLogger initialized"
        );
        Ok(Self {
            router: Router::default(),
            writer: TabularWriter::new(config),
        })
    }

    /// Use a custom delimiter / default category.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Log one observation.
    ///
    /// `"cat/name"` keys go to category `cat`, bare keys to the default
    /// category. Every touched category gets one row at `step`. Category
    /// names are all checked before anything is written, so a bad prefix
    /// rejects the whole observation.
    pub fn log<I, K, V>(&mut self, metrics: I, step: u64) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<MetricValue>,
    {
        let routed = self.router.route(metrics);
        for category in routed.keys() {
            validate_category(category)?;
        }
        for (category, fields) in routed {
            self.writer.write(&category, fields, step)?;
        }
        Ok(())
    }

    /// Append a row to a single category without routing.
    pub fn write<I, K, V>(&mut self, category: &str, fields: I, step: u64) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MetricValue>,
    {
        self.writer.write(category, fields, step)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }

    /// Flush and release every open file. Idempotent; logging again later
    /// reopens files in append fashion.
    pub fn close(&mut self) -> Result<()> {
        self.writer.close()
    }

    /// Column order of a category, if it has been written in this run.
    pub fn columns(&self, category: &str) -> Option<&[String]> {
        self.writer.category(category).map(CategoryFile::columns)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.writer.categories().map(CategoryFile::name)
    }

    pub fn config(&self) -> &LoggerConfig {
        self.writer.config()
    }
}

impl Drop for MetricsLogger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close metrics logger: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn log_accepts_maps_and_pairs() {
        let tmp = TempDir::new().unwrap();
        let mut logger = MetricsLogger::new(LoggerConfig::new("job", tmp.path())).unwrap();

        let mut m: HashMap<String, MetricValue> = HashMap::new();
        m.insert("loss".into(), MetricValue::Float(0.5));
        m.insert("val/acc".into(), MetricValue::Float(0.9));
        logger.log(&m, 0).unwrap();
        logger.log([("loss", 0.4)], 1).unwrap();

        let mut cats: Vec<_> = logger.categories().collect();
        cats.sort();
        assert_eq!(cats, vec!["train", "val"]);
        assert_eq!(
            logger.columns("val").unwrap(),
            ["global_step", "timestamp", "acc"]
        );
        assert!(logger.columns("test").is_none());
    }

    #[test]
    fn custom_router_changes_default_category() {
        let tmp = TempDir::new().unwrap();
        let mut logger = MetricsLogger::new(LoggerConfig::new("job", tmp.path()))
            .unwrap()
            .with_router(Router::new('/', "misc"));
        logger.log([("lr", 0.1)], 0).unwrap();
        assert!(tmp.path().join("job/misc/log.csv").exists());
        assert!(!tmp.path().join("job/train").exists());
    }

    #[test]
    fn invalid_category_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut logger = MetricsLogger::new(LoggerConfig::new("job", tmp.path())).unwrap();
        assert!(logger.log([("../escape", 1.0)], 0).is_err());
        assert!(logger.log([("/loss", 1.0)], 0).is_err());
    }

    #[test]
    fn bad_prefix_rejects_whole_observation() {
        let tmp = TempDir::new().unwrap();
        let mut logger = MetricsLogger::new(LoggerConfig::new("job", tmp.path())).unwrap();
        assert!(logger.log([("a/x", 1.0), ("b\\c/y", 2.0)], 0).is_err());
        assert!(!tmp.path().join("job/a").exists());
        assert_eq!(logger.categories().count(), 0);
    }
}
