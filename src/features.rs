//! Feature Builder: calendar, exogenous, lag and rolling features.
//!
//! Every feature of a row is computed from that row's timestamp and from
//! rows at or before it, never after. The first `history` rows, where some
//! lag or window would reach before the start of the table, are dropped.
//!
//! The names of the produced columns travel with the data as a
//! [`FeatureSchema`], which the model freezes at fit time and checks again
//! at prediction time.

use crate::error::{ForecastError, Result};
use crate::models::TimeSeriesTable;
use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// Features derived from a row's own timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarFeature {
    Hour,
    /// Monday = 0
    DayOfWeek,
    Month,
    IsWeekend,
}

impl CalendarFeature {
    pub const ALL: [CalendarFeature; 4] = [
        CalendarFeature::Hour,
        CalendarFeature::DayOfWeek,
        CalendarFeature::Month,
        CalendarFeature::IsWeekend,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CalendarFeature::Hour => "hour",
            CalendarFeature::DayOfWeek => "day_of_week",
            CalendarFeature::Month => "month",
            CalendarFeature::IsWeekend => "is_weekend",
        }
    }

    pub fn value(&self, timestamp: &NaiveDateTime) -> f64 {
        match self {
            CalendarFeature::Hour => timestamp.hour() as f64,
            CalendarFeature::DayOfWeek => timestamp.weekday().num_days_from_monday() as f64,
            CalendarFeature::Month => timestamp.month() as f64,
            CalendarFeature::IsWeekend => {
                matches!(timestamp.weekday(), Weekday::Sat | Weekday::Sun) as u8 as f64
            }
        }
    }
}

/// Resolved options for one feature build
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub target_column: String,
    pub calendar_features: Vec<CalendarFeature>,
    pub lag_offsets: BTreeSet<usize>,
    pub rolling_windows: BTreeSet<usize>,
    pub lag_columns: Vec<String>,
    pub rolling_columns: Vec<String>,
    pub exogenous_columns: Vec<String>,
}

impl FeatureConfig {
    /// Rows needed before the first complete feature vector
    pub fn history(&self) -> usize {
        let max_lag = if self.lag_columns.is_empty() {
            0
        } else {
            self.lag_offsets.iter().copied().max().unwrap_or(0)
        };
        let max_window = if self.rolling_columns.is_empty() {
            0
        } else {
            self.rolling_windows.iter().copied().max().unwrap_or(0)
        };
        max_lag.max(max_window)
    }
}

/// Ordered, unique feature names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(ForecastError::configuration(
                "no features configured: enable calendar, lag, rolling or exogenous features",
            ));
        }
        let mut seen = HashSet::with_capacity(names.len());
        if let Some(duplicate) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(ForecastError::configuration(format!(
                "feature '{}' is defined twice",
                duplicate
            )));
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Feature values for one timestamp, ordered as the schema
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub timestamp: NaiveDateTime,
    pub values: Vec<f64>,
}

/// Feature vectors with their aligned targets
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    schema: FeatureSchema,
    vectors: Vec<FeatureVector>,
    targets: Vec<Option<f64>>,
}

impl FeatureMatrix {
    pub fn new(
        schema: FeatureSchema,
        vectors: Vec<FeatureVector>,
        targets: Vec<Option<f64>>,
    ) -> Result<Self> {
        if vectors.len() != targets.len() {
            return Err(ForecastError::configuration(format!(
                "{} feature vectors but {} targets",
                vectors.len(),
                targets.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.values.len() != schema.len()) {
            return Err(ForecastError::configuration(format!(
                "feature vector at {} has {} values for {} features",
                bad.timestamp,
                bad.values.len(),
                schema.len()
            )));
        }
        Ok(Self {
            schema,
            vectors,
            targets,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn targets(&self) -> &[Option<f64>] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Rows `range` as a new matrix with the same schema
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        Self {
            schema: self.schema.clone(),
            vectors: self.vectors[range.clone()].to_vec(),
            targets: self.targets[range].to_vec(),
        }
    }
}

/// One column of the output, with how to compute it at row `i`
enum FeatureKind {
    Calendar(CalendarFeature),
    Current { column: usize },
    Lag { column: usize, offset: usize },
    RollingMean { column: usize, window: usize },
    RollingStd { column: usize, window: usize },
}

/// Build features from a cleaned table
pub fn build_features(table: &TimeSeriesTable, config: &FeatureConfig) -> Result<FeatureMatrix> {
    let column_data = |name: &str| -> Result<Vec<f64>> {
        let values = table
            .column_values(name)
            .ok_or_else(|| ForecastError::missing_column(name, "cleaned table"))?;
        values
            .into_iter()
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| {
                ForecastError::configuration(format!(
                    "column '{}' still has missing values; clean the table first",
                    name
                ))
            })
    };

    let target_index = table
        .column_index(&config.target_column)
        .ok_or_else(|| ForecastError::missing_column(&config.target_column, "cleaned table"))?;

    // column index -> dense values, loaded once per referenced column
    let mut data: Vec<Option<Vec<f64>>> = vec![None; table.columns().len()];
    let mut resolve = |name: &str| -> Result<usize> {
        let index = table
            .column_index(name)
            .ok_or_else(|| ForecastError::missing_column(name, "cleaned table"))?;
        if data[index].is_none() {
            data[index] = Some(column_data(name)?);
        }
        Ok(index)
    };

    let mut names = Vec::new();
    let mut kinds = Vec::new();

    for feature in &config.calendar_features {
        names.push(feature.name().to_string());
        kinds.push(FeatureKind::Calendar(*feature));
    }
    for column in &config.exogenous_columns {
        let index = resolve(column)?;
        names.push(column.clone());
        kinds.push(FeatureKind::Current { column: index });
    }
    for column in &config.lag_columns {
        let index = resolve(column)?;
        for &offset in &config.lag_offsets {
            names.push(format!("{}_lag{}", column, offset));
            kinds.push(FeatureKind::Lag {
                column: index,
                offset,
            });
        }
    }
    for column in &config.rolling_columns {
        let index = resolve(column)?;
        for &window in &config.rolling_windows {
            names.push(format!("{}_roll_mean{}", column, window));
            kinds.push(FeatureKind::RollingMean {
                column: index,
                window,
            });
            names.push(format!("{}_roll_std{}", column, window));
            kinds.push(FeatureKind::RollingStd {
                column: index,
                window,
            });
        }
    }
    resolve(&config.target_column)?;

    let schema = FeatureSchema::new(names)?;
    let history = config.history();
    if table.len() <= history {
        return Err(ForecastError::InsufficientData {
            needed: history,
            available: table.len(),
        });
    }

    let records = table.records();
    let mut vectors = Vec::with_capacity(records.len() - history);
    let mut targets = Vec::with_capacity(records.len() - history);

    for row in history..records.len() {
        let timestamp = records[row].timestamp;
        let values = kinds
            .iter()
            .map(|kind| match *kind {
                FeatureKind::Calendar(feature) => feature.value(&timestamp),
                FeatureKind::Current { column } => series(&data, column)[row],
                FeatureKind::Lag { column, offset } => series(&data, column)[row - offset],
                FeatureKind::RollingMean { column, window } => {
                    mean(trailing(series(&data, column), row, window))
                }
                FeatureKind::RollingStd { column, window } => {
                    sample_std(trailing(series(&data, column), row, window))
                }
            })
            .collect();

        vectors.push(FeatureVector { timestamp, values });
        targets.push(Some(series(&data, target_index)[row]));
    }

    info!(
        "Built {} features for {} rows ({} history rows dropped)",
        schema.len(),
        vectors.len(),
        history
    );
    debug!("Feature schema: {:?}", schema.names());

    FeatureMatrix::new(schema, vectors, targets)
}

/// Values of a column resolved by `build_features`
fn series(data: &[Option<Vec<f64>>], column: usize) -> &[f64] {
    data[column].as_deref().unwrap_or(&[])
}

/// Window of `window` values ending at and including `row`
fn trailing(values: &[f64], row: usize, window: usize) -> &[f64] {
    &values[row + 1 - window..=row]
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with n - 1 in the denominator
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
