//! Data models for scalarlog.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScalarlogError};

/// Reserved leading column holding the caller's step counter.
pub const GLOBAL_STEP: &str = "global_step";
/// Reserved leading column holding wall-clock Unix seconds.
pub const TIMESTAMP: &str = "timestamp";
/// File name of every category log.
pub const LOG_FILE_NAME: &str = "log.csv";

/// What to do with a pre-existing category log the first time it is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunMode {
    /// Keep appending to whatever is already on disk.
    #[default]
    #[serde(rename = "append", alias = "a")]
    Append,
    /// Move the old file aside to a timestamped `.bak` and start over.
    #[serde(rename = "fresh-start", alias = "fresh_start", alias = "w")]
    FreshStart,
}

impl FromStr for RunMode {
    type Err = ScalarlogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" | "a" => Ok(RunMode::Append),
            "fresh-start" | "fresh_start" | "w" => Ok(RunMode::FreshStart),
            other => Err(ScalarlogError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Append => write!(f, "append"),
            RunMode::FreshStart => write!(f, "fresh-start"),
        }
    }
}

/// Configuration for a metrics logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Name of the job (e.g. "resnet_cifar10"); one directory per job
    pub job_name: String,
    /// Root directory that holds job directories (default: current directory)
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Lifecycle mode for pre-existing category files (default: append)
    #[serde(default)]
    pub mode: RunMode,
}

fn default_base_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

impl LoggerConfig {
    pub fn new(job_name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_name: job_name.into(),
            base_dir: base_dir.into(),
            mode: RunMode::Append,
        }
    }

    /// Config rooted at the process's current working directory.
    pub fn in_current_dir(job_name: impl Into<String>) -> Self {
        Self::new(job_name, default_base_dir())
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Load a config from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn job_dir(&self) -> PathBuf {
        self.base_dir.join(&self.job_name)
    }

    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.job_dir().join(category)
    }

    pub fn category_path(&self, category: &str) -> PathBuf {
        self.category_dir(category).join(LOG_FILE_NAME)
    }
}

/// A single metric value: numeric, text or empty.
///
/// Each variant has exactly one CSV rendering, see [`MetricValue::to_cell`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Empty,
}

impl MetricValue {
    /// Render the value as a CSV cell.
    ///
    /// Integral floats keep a trailing `.0` so a float column never reads
    /// back as integers; non-finite floats render as `nan`, `inf`, `-inf`.
    pub fn to_cell(&self) -> String {
        match self {
            MetricValue::Int(i) => i.to_string(),
            MetricValue::Float(f) => format_float(*f),
            MetricValue::Bool(true) => "True".to_string(),
            MetricValue::Bool(false) => "False".to_string(),
            MetricValue::Text(s) => s.clone(),
            MetricValue::Empty => String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, MetricValue::Empty)
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f == f64::INFINITY {
        "inf".to_string()
    } else if f == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if f != 0.0 && (f.abs() < 1e-4 || f.abs() >= 1e16) {
        format_exponent(f)
    } else if f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

/// Shortest round-trip mantissa with a signed, at least two-digit exponent
/// (`1e+300`, `1.5e-05`).
fn format_exponent(f: f64) -> String {
    let shortest = format!("{:e}", f);
    match shortest.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => shortest,
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cell())
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}
impl From<f32> for MetricValue {
    fn from(v: f32) -> Self {
        MetricValue::Float(v as f64)
    }
}
impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}
impl From<i32> for MetricValue {
    fn from(v: i32) -> Self {
        MetricValue::Int(v as i64)
    }
}
impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(MetricValue::Int)
            .unwrap_or(MetricValue::Float(v as f64))
    }
}
impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::from(v as u64)
    }
}
impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}
impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}
impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}
impl From<&MetricValue> for MetricValue {
    fn from(v: &MetricValue) -> Self {
        v.clone()
    }
}
impl<T: Into<MetricValue>> From<Option<T>> for MetricValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(MetricValue::Empty)
    }
}

/// Current wall-clock time as floating-point Unix seconds.
pub fn unix_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// One row destined for a category file.
///
/// Always carries `global_step` and `timestamp`; metric fields with one of
/// those names replace the reserved value.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: BTreeMap<String, MetricValue>,
}

impl Record {
    pub fn new(step: u64, timestamp: f64, fields: impl IntoIterator<Item = (String, MetricValue)>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(GLOBAL_STEP.to_string(), MetricValue::from(step));
        values.insert(TIMESTAMP.to_string(), MetricValue::Float(timestamp));
        values.extend(fields);
        Self { values }
    }

    /// Record stamped with the current time.
    pub fn now(step: u64, fields: impl IntoIterator<Item = (String, MetricValue)>) -> Self {
        Self::new(step, unix_timestamp(), fields)
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serialize against `columns`: missing keys render empty, keys outside
    /// `columns` are dropped.
    pub fn to_row(&self, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .map(|c| self.values.get(c).map(MetricValue::to_cell).unwrap_or_default())
            .collect()
    }
}
