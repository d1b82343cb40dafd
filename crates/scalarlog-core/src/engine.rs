//! Single-writer logging engine for multi-threaded callers.
//!
//! `LoggingEngine::new()` spawns a background tokio task that owns the
//! [`MetricsLogger`] and therefore every category file handle.
//! `log_metrics()` is a channel send, so any number of threads can log
//! while each category still has exactly one writer.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::error::{Result, ScalarlogError};
use crate::logger::MetricsLogger;
use crate::models::{LoggerConfig, MetricValue};

/// Commands sent to the background logging task.
enum LogCommand {
    /// Log one observation.
    Metrics {
        values: Vec<(String, MetricValue)>,
        step: u64,
    },
    /// Flush every open file and report the first write error since the last report.
    Flush(oneshot::Sender<Result<()>>),
    /// Close every file and stop the task.
    Shutdown(oneshot::Sender<Result<()>>),
}

/// Thread-safe front end to a [`MetricsLogger`].
///
/// Internally holds a sender to a tokio mpsc channel; all file I/O happens
/// in a background task on a dedicated runtime thread, in the order the
/// commands were sent.
pub struct LoggingEngine {
    sender: mpsc::UnboundedSender<LogCommand>,
    /// Keep the runtime alive as long as the engine exists.
    runtime: Arc<Runtime>,
    config: LoggerConfig,
}

impl LoggingEngine {
    /// Create the logger (surfacing configuration errors immediately) and
    /// spawn the background task that will own it.
    pub fn new(config: LoggerConfig) -> Result<Self> {
        let logger = MetricsLogger::new(config.clone())?;

        let runtime = Arc::new(
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("scalarlog-io")
                .enable_all()
                .build()
                .map_err(|e| ScalarlogError::Other(e.to_string()))?,
        );

        let (sender, receiver) = mpsc::unbounded_channel::<LogCommand>();
        runtime.spawn(background_task(receiver, logger));

        info!(job = %config.job_name, "LoggingEngine initialized");

        Ok(Self {
            sender,
            runtime,
            config,
        })
    }

    /// Queue one observation. Non-blocking; write errors surface from the
    /// next `flush` or `close`.
    pub fn log_metrics<I, K, V>(&self, metrics: I, step: u64)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MetricValue>,
    {
        let values = metrics
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        // If the engine is shut down, silently drop.
        let _ = self.sender.send(LogCommand::Metrics { values, step });
    }

    /// Wait until everything queued so far is on disk.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LogCommand::Flush(tx))
            .map_err(|_| ScalarlogError::ChannelClosed)?;
        rx.await.map_err(|_| ScalarlogError::ChannelClosed)?
    }

    /// Blocking variant of [`flush`](Self::flush) for non-async callers.
    /// Must not be called from inside a tokio runtime.
    pub fn flush_blocking(&self) -> Result<()> {
        self.runtime.block_on(self.flush())
    }

    /// Drain the queue, close every file and stop the background task.
    /// Blocks until done. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(LogCommand::Shutdown(tx)).is_err() {
            return Ok(());
        }
        self.runtime
            .block_on(rx)
            .map_err(|_| ScalarlogError::ChannelClosed)?
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }
}

impl Drop for LoggingEngine {
    fn drop(&mut self) {
        // Best-effort graceful shutdown on drop
        let (tx, rx) = oneshot::channel();
        if self.sender.send(LogCommand::Shutdown(tx)).is_ok() {
            let _ = self
                .runtime
                .block_on(async { tokio::time::timeout(Duration::from_secs(5), rx).await });
        }
    }
}

// ─── Background I/O task ─────────────────────────────────────────────────────

async fn background_task(
    mut receiver: mpsc::UnboundedReceiver<LogCommand>,
    mut logger: MetricsLogger,
) {
    let mut pending: Option<ScalarlogError> = None;

    while let Some(cmd) = receiver.recv().await {
        match cmd {
            LogCommand::Metrics { values, step } => {
                if let Err(e) = logger.log(values, step) {
                    error!(step, "Failed to log metrics: {}", e);
                    pending.get_or_insert(e);
                }
            }
            LogCommand::Flush(reply) => {
                let result = match pending.take() {
                    Some(e) => Err(e),
                    None => logger.flush(),
                };
                let _ = reply.send(result);
            }
            LogCommand::Shutdown(reply) => {
                let closed = logger.close();
                let result = match pending.take() {
                    Some(e) => Err(e),
                    None => closed,
                };
                let _ = reply.send(result);
                return;
            }
        }
    }

    // Channel closed without an explicit shutdown.
    if let Err(e) = logger.close() {
        error!("Failed to close metrics logger: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn close_twice_is_fine() {
        let tmp = TempDir::new().unwrap();
        let engine = LoggingEngine::new(LoggerConfig::new("job", tmp.path())).unwrap();
        engine.log_metrics([("loss", 0.5)], 0);
        engine.close().unwrap();
        engine.close().unwrap();
        assert!(tmp.path().join("job/train/log.csv").exists());
    }

    #[test]
    fn flush_makes_rows_visible() {
        let tmp = TempDir::new().unwrap();
        let engine = LoggingEngine::new(LoggerConfig::new("job", tmp.path())).unwrap();
        engine.log_metrics([("val/acc", 0.9)], 3);
        engine.flush_blocking().unwrap();

        let content = fs::read_to_string(tmp.path().join("job/val/log.csv")).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().nth(1).unwrap().starts_with("3,"));
        engine.close().unwrap();
    }

    #[test]
    fn write_errors_surface_on_flush() {
        let tmp = TempDir::new().unwrap();
        let engine = LoggingEngine::new(LoggerConfig::new("job", tmp.path())).unwrap();
        engine.log_metrics([("../up", 1.0)], 0);
        assert!(matches!(
            engine.flush_blocking(),
            Err(ScalarlogError::InvalidCategory(_))
        ));
        // Reported once.
        engine.flush_blocking().unwrap();
        engine.close().unwrap();
    }

    #[test]
    fn many_threads_one_writer() {
        let tmp = TempDir::new().unwrap();
        let engine = Arc::new(LoggingEngine::new(LoggerConfig::new("job", tmp.path())).unwrap());

        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for i in 0..25u64 {
                        let key = format!("worker_{t}");
                        engine.log_metrics([(key, i as f64)], t * 100 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        engine.close().unwrap();

        let table = crate::storage::read_table(&tmp.path().join("job/train/log.csv")).unwrap();
        assert_eq!(table.rows.len(), 100);
        assert_eq!(table.header.len(), 6);
        for row in &table.rows {
            assert_eq!(row.len(), table.header.len());
        }
    }
}
