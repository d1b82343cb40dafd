//! Error types for scalarlog-core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScalarlogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid category name: {0:?}")]
    InvalidCategory(String),

    #[error("Invalid run mode: {0:?} (expected \"append\" or \"fresh-start\")")]
    InvalidMode(String),

    #[error("Logging engine channel closed")]
    ChannelClosed,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ScalarlogError>;
