//! PyO3 Python extension module for scalarlog.
//!
//! Exposes a `CsvLogger` class to Python. Every `log()` call writes and
//! flushes one row per touched category before returning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pyo3::prelude::*;
use pyo3::types::PyDict;

use scalarlog::{LoggerConfig, MetricValue, MetricsLogger, RunMode, ScalarlogError};

/// Python-facing CSV logger.
#[pyclass]
struct CsvLogger {
    logger: Arc<Mutex<Option<MetricsLogger>>>,
    job_dir: String,
}

#[pymethods]
impl CsvLogger {
    /// Create a logger for a job.
    ///
    /// Args:
    ///     job_name: Job directory name under base_dir
    ///     base_dir: Root directory. Default: current working directory
    ///     mode: "a"/"append" keeps existing logs, "w"/"fresh-start" backs them up first
    #[new]
    #[pyo3(signature = (job_name, base_dir=None, mode="a"))]
    fn new(job_name: &str, base_dir: Option<&str>, mode: &str) -> PyResult<Self> {
        let mode: RunMode = mode.parse().map_err(to_py_err)?;
        let config = match base_dir {
            Some(dir) => LoggerConfig::new(job_name, dir),
            None => LoggerConfig::in_current_dir(job_name),
        }
        .with_mode(mode);
        let job_dir = config.job_dir().to_string_lossy().to_string();

        let logger = MetricsLogger::new(config).map_err(to_py_err)?;

        Ok(Self {
            logger: Arc::new(Mutex::new(Some(logger))),
            job_dir,
        })
    }

    /// Log a dictionary of metrics at `step`.
    ///
    /// Args:
    ///     metrics: Dict of metric name → value; "val/acc" goes to the "val" log
    ///     step: Global step of the observation
    fn log(&self, metrics: &Bound<'_, PyDict>, step: u64) -> PyResult<()> {
        let converted = py_dict_to_metrics(metrics)?;
        self.with_logger(|logger| logger.log(&converted, step))
    }

    /// Flush every open log file.
    fn flush(&self) -> PyResult<()> {
        self.with_logger(|logger| logger.flush())
    }

    /// Column names of a category's log, or None if it has not been written yet.
    fn columns(&self, category: &str) -> PyResult<Option<Vec<String>>> {
        let guard = self
            .logger
            .lock()
            .map_err(|_| pyo3::exceptions::PyRuntimeError::new_err("Logger lock poisoned"))?;
        Ok(guard
            .as_ref()
            .and_then(|logger| logger.columns(category))
            .map(|cols| cols.to_vec()))
    }

    /// Get the job directory path.
    #[getter]
    fn job_dir(&self) -> String {
        self.job_dir.clone()
    }

    /// Close all log files. Safe to call more than once.
    fn close(&self) -> PyResult<()> {
        self.take_and_close()
    }

    fn __enter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    #[pyo3(signature = (_exc_type=None, _exc_val=None, _exc_tb=None))]
    fn __exit__(
        &self,
        _exc_type: Option<&Bound<'_, PyAny>>,
        _exc_val: Option<&Bound<'_, PyAny>>,
        _exc_tb: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<bool> {
        self.take_and_close()?;
        Ok(false) // Don't suppress exceptions
    }

    fn __del__(&self) {
        // Best-effort close on GC
        let _ = self.take_and_close();
    }

    fn __repr__(&self) -> String {
        let open = self
            .logger
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false);
        if open {
            format!("CsvLogger(job_dir={:?})", self.job_dir)
        } else {
            "CsvLogger(closed)".to_string()
        }
    }
}

impl CsvLogger {
    fn with_logger<F>(&self, f: F) -> PyResult<()>
    where
        F: FnOnce(&mut MetricsLogger) -> scalarlog::Result<()>,
    {
        let mut guard = self
            .logger
            .lock()
            .map_err(|_| pyo3::exceptions::PyRuntimeError::new_err("Logger lock poisoned"))?;
        match guard.as_mut() {
            Some(logger) => f(logger).map_err(to_py_err),
            None => Err(pyo3::exceptions::PyRuntimeError::new_err("Logger is closed")),
        }
    }

    fn take_and_close(&self) -> PyResult<()> {
        if let Ok(mut guard) = self.logger.lock() {
            if let Some(mut logger) = guard.take() {
                logger.close().map_err(to_py_err)?;
            }
        }
        Ok(())
    }
}

// ─── Type conversion helpers ──────────────────────────────────────────────────

fn to_py_err(e: ScalarlogError) -> PyErr {
    match e {
        ScalarlogError::Io(io) => pyo3::exceptions::PyIOError::new_err(io.to_string()),
        ScalarlogError::InvalidCategory(_) | ScalarlogError::InvalidMode(_) => {
            pyo3::exceptions::PyValueError::new_err(e.to_string())
        }
        other => pyo3::exceptions::PyRuntimeError::new_err(other.to_string()),
    }
}

fn py_dict_to_metrics(dict: &Bound<'_, PyDict>) -> PyResult<HashMap<String, MetricValue>> {
    let mut map = HashMap::new();
    for (k, v) in dict.iter() {
        let key: String = k.extract()?;
        // bool before int: Python bools are ints
        let val = if v.is_none() {
            MetricValue::Empty
        } else if let Ok(b) = v.extract::<bool>() {
            MetricValue::Bool(b)
        } else if let Ok(i) = v.extract::<i64>() {
            MetricValue::Int(i)
        } else if let Ok(f) = v.extract::<f64>() {
            MetricValue::Float(f)
        } else if let Ok(s) = v.extract::<String>() {
            MetricValue::Text(s)
        } else {
            MetricValue::Text(v.str()?.to_string())
        };
        map.insert(key, val);
    }
    Ok(map)
}

// ─── Module definition ────────────────────────────────────────────────────────

#[pymodule]
#[pyo3(name = "scalarlog")]
fn scalarlog_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<CsvLogger>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
