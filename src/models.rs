//! Core data structures shared by the pipeline stages.
//!
//! Tables are immutable once built: each stage takes a `&TimeSeriesTable`
//! and returns a new one, so every stage can be tested on its own.

use chrono::NaiveDateTime;
use std::path::PathBuf;

/// One time-stamped observation
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp: NaiveDateTime,
    /// One slot per table column; `None` is a missing measurement
    pub values: Vec<Option<f64>>,
}

impl Record {
    pub fn new(timestamp: NaiveDateTime, values: Vec<Option<f64>>) -> Self {
        Self { timestamp, values }
    }
}

/// Ordered sequence of records sharing a column layout
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeriesTable {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl TimeSeriesTable {
    /// Build a table. Every record must carry one value per column.
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> crate::Result<Self> {
        if let Some(bad) = records.iter().find(|r| r.values.len() != columns.len()) {
            return Err(crate::ForecastError::configuration(format!(
                "record at {} has {} values for {} columns",
                bad.timestamp,
                bad.values.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, records })
    }

    /// Same column layout, different records
    pub(crate) fn with_records(&self, records: Vec<Record>) -> Self {
        Self {
            columns: self.columns.clone(),
            records,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column in row order
    pub fn column_values(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let index = self.column_index(name)?;
        Some(self.records.iter().map(|r| r.values[index]).collect())
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.records.iter().map(|r| r.timestamp).collect()
    }

    /// Number of missing cells across all columns
    pub fn missing_count(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.values.iter().filter(|v| v.is_none()).count())
            .sum()
    }
}

/// A row rejected while loading
#[derive(Debug, Clone, PartialEq)]
pub struct RowIssue {
    /// 1-based data row (header excluded)
    pub row: usize,
    pub column: String,
    pub value: String,
    pub reason: String,
}

/// Outcome of loading one source file
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub path: PathBuf,
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub issues: Vec<RowIssue>,
    /// Timestamps were borrowed from the traffic table
    pub timestamps_aligned: bool,
}

impl LoadReport {
    pub fn rows_dropped(&self) -> usize {
        self.rows_read - self.rows_loaded
    }
}

/// Counts of everything the cleaner changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub duplicates_dropped: usize,
    pub forward_filled: usize,
    pub mean_filled: usize,
    pub rows_out: usize,
}

impl CleaningReport {
    pub fn values_imputed(&self) -> usize {
        self.forward_filled + self.mean_filled
    }
}

/// Model output for one held-out observation
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub timestamp: NaiveDateTime,
    pub actual: Option<f64>,
    pub predicted: f64,
    /// actual - predicted, when the actual is known
    pub residual: Option<f64>,
}

impl PredictionRecord {
    pub fn new(timestamp: NaiveDateTime, actual: Option<f64>, predicted: f64) -> Self {
        Self {
            timestamp,
            actual,
            predicted,
            residual: actual.map(|a| a - predicted),
        }
    }
}

/// Accuracy of a fitted model on the test suffix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r_squared: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Statistics for one end-to-end pipeline run
#[derive(Debug, Default)]
pub struct RunStats {
    pub rows_read: usize,
    /// Rows dropped for unparseable timestamps or values
    pub rows_dropped: usize,
    /// Rows without a timestamp partner in the other file
    pub rows_unmatched: usize,
    pub duplicates_dropped: usize,
    pub values_imputed: usize,
    pub feature_rows: usize,
    pub metrics: Option<EvaluationMetrics>,
    pub predictions_path: Option<PathBuf>,
    pub metrics_path: Option<PathBuf>,
    pub chart_paths: Vec<PathBuf>,
    pub chart_failures: Vec<String>,
    pub processing_time_ms: u128,
}
