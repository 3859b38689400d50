//! Error handling for forecasting pipeline operations.
//!
//! Provides error types with enough context (column, path, row) to tell
//! which input or artifact caused a stage to fail.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Dataset not found at path: {path}")]
    DatasetNotFound { path: PathBuf },

    #[error("Missing required column '{column}' in {path}")]
    MissingColumn { column: String, path: PathBuf },

    #[error("Parse error in {path}, row {row}: {message}")]
    Parse {
        path: PathBuf,
        row: usize,
        message: String,
    },

    #[error("Schema mismatch: feature '{missing}' expected by the model is absent (expected {expected:?})")]
    SchemaMismatch {
        missing: String,
        expected: Vec<String>,
    },

    #[error("No rows left after {stage}")]
    EmptyTable { stage: String },

    #[error("Column '{column}' has no observed values to impute from")]
    EmptyColumn { column: String },

    #[error("Insufficient data: need more than {needed} rows, found {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Cannot fit: none of the {rows} training rows has a known target value")]
    NoTrainingTargets { rows: usize },

    #[error("Non-finite value in '{column}' at {timestamp}")]
    NonFiniteValue { column: String, timestamp: String },

    #[error("Least squares solve failed: {message}")]
    Solver { message: String },

    #[error("Chart rendering failed for {path}: {message}")]
    Chart { path: PathBuf, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ForecastError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn missing_column(column: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            path: path.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn empty_table(stage: impl Into<String>) -> Self {
        Self::EmptyTable {
            stage: stage.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
