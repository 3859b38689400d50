//! Configuration management and validation.
//!
//! A single [`PipelineConfig`] is passed explicitly through every stage.
//! It can be built from defaults, loaded from a TOML file, and then
//! overridden field by field from the command line.

use crate::constants::{
    DATETIME_COLUMN, DEFAULT_LAG_OFFSETS, DEFAULT_OUTPUT_DIR, DEFAULT_ROLLING_WINDOWS,
    DEFAULT_TRAIN_FRACTION, PM25_COLUMN, TRAFFIC_VOLUME_COLUMN,
};
use crate::error::{ForecastError, Result};
use crate::features::{CalendarFeature, FeatureConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How the predictions file is written when it already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Replace the file atomically
    #[default]
    Overwrite,
    /// Add this run's rows after the existing ones
    Append,
}

/// Global configuration for a forecasting run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Timestamp column in both source files
    pub timestamp_column: String,

    /// Column the model predicts
    pub target_column: String,

    /// Measurement columns read from the traffic file
    pub traffic_columns: Vec<String>,

    /// Measurement columns read from the pollution file
    pub pollution_columns: Vec<String>,

    /// Lag offsets in periods
    pub lag_offsets: BTreeSet<usize>,

    /// Trailing window sizes in periods
    pub rolling_windows: BTreeSet<usize>,

    /// Columns to lag (default: the target)
    pub lag_columns: Option<Vec<String>>,

    /// Columns to roll (default: the exogenous columns)
    pub rolling_columns: Option<Vec<String>>,

    /// Columns used as-is (default: every measurement column but the target)
    pub exogenous_columns: Option<Vec<String>>,

    pub calendar_features: Vec<CalendarFeature>,

    /// Share of feature rows used for training, in (0, 1)
    pub train_fraction: f64,

    pub output_dir: PathBuf,

    pub write_mode: WriteMode,

    pub render_charts: bool,

    /// Borrow traffic timestamps for a pollution file that has none
    pub align_missing_timestamps: bool,

    /// Read ambiguous locale dates such as `01/11/2015` as day/month
    pub day_first: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timestamp_column: DATETIME_COLUMN.to_string(),
            target_column: TRAFFIC_VOLUME_COLUMN.to_string(),
            traffic_columns: vec![TRAFFIC_VOLUME_COLUMN.to_string()],
            pollution_columns: vec![PM25_COLUMN.to_string()],
            lag_offsets: DEFAULT_LAG_OFFSETS.iter().copied().collect(),
            rolling_windows: DEFAULT_ROLLING_WINDOWS.iter().copied().collect(),
            lag_columns: None,
            rolling_columns: None,
            exogenous_columns: None,
            calendar_features: CalendarFeature::ALL.to_vec(),
            train_fraction: DEFAULT_TRAIN_FRACTION,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            write_mode: WriteMode::Overwrite,
            render_charts: true,
            align_missing_timestamps: true,
            day_first: false,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file; absent keys keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ForecastError::io(path, e))?;
        let config: Self = toml::from_str(&text).map_err(|e| {
            ForecastError::configuration(format!("invalid config file {}: {}", path.display(), e))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn with_target(mut self, target_column: impl Into<String>) -> Self {
        self.target_column = target_column.into();
        self
    }

    pub fn with_lag_offsets(mut self, offsets: impl IntoIterator<Item = usize>) -> Self {
        self.lag_offsets = offsets.into_iter().collect();
        self
    }

    pub fn with_rolling_windows(mut self, windows: impl IntoIterator<Item = usize>) -> Self {
        self.rolling_windows = windows.into_iter().collect();
        self
    }

    pub fn with_calendar_features(mut self, features: Vec<CalendarFeature>) -> Self {
        self.calendar_features = features;
        self
    }

    pub fn with_train_fraction(mut self, train_fraction: f64) -> Self {
        self.train_fraction = train_fraction;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    pub fn with_day_first(mut self, day_first: bool) -> Self {
        self.day_first = day_first;
        self
    }

    pub fn without_charts(mut self) -> Self {
        self.render_charts = false;
        self
    }

    /// Every measurement column the run reads, traffic columns first
    pub fn measurement_columns(&self, with_pollution: bool) -> Vec<String> {
        let mut columns = self.traffic_columns.clone();
        if with_pollution {
            columns.extend(self.pollution_columns.iter().cloned());
        }
        columns
    }

    /// Check option ranges and cross-field consistency
    pub fn validate(&self) -> Result<()> {
        if self.timestamp_column.trim().is_empty() {
            return Err(ForecastError::configuration("timestamp_column is empty"));
        }
        if self.target_column.trim().is_empty() {
            return Err(ForecastError::configuration("target_column is empty"));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(ForecastError::configuration(format!(
                "train_fraction must be in (0, 1), got {}",
                self.train_fraction
            )));
        }
        if self.lag_offsets.is_empty() {
            return Err(ForecastError::configuration(
                "at least one lag offset is required",
            ));
        }
        if self.lag_offsets.contains(&0) {
            return Err(ForecastError::configuration(
                "lag offsets must be at least 1 period",
            ));
        }
        if let Some(window) = self.rolling_windows.iter().find(|w| **w < 2) {
            return Err(ForecastError::configuration(format!(
                "rolling window {} is too small; windows need at least 2 periods",
                window
            )));
        }

        let all_columns = self.measurement_columns(true);
        let mut seen = BTreeSet::new();
        for column in &all_columns {
            if !seen.insert(column) {
                return Err(ForecastError::configuration(format!(
                    "measurement column '{}' is listed more than once",
                    column
                )));
            }
        }
        if !all_columns.contains(&self.target_column) {
            return Err(ForecastError::configuration(format!(
                "target column '{}' is not a traffic or pollution column",
                self.target_column
            )));
        }

        if self
            .exogenous_columns
            .as_ref()
            .is_some_and(|cols| cols.contains(&self.target_column))
        {
            return Err(ForecastError::configuration(format!(
                "target column '{}' cannot also be an exogenous feature",
                self.target_column
            )));
        }

        if self
            .rolling_columns
            .as_ref()
            .is_some_and(|cols| cols.contains(&self.target_column))
        {
            warn!(
                "Rolling statistics over the target '{}' include the current value",
                self.target_column
            );
        }

        Ok(())
    }

    /// Resolve the feature builder's options for the columns actually loaded
    pub fn feature_config(&self, available_columns: &[String]) -> FeatureConfig {
        let exogenous: Vec<String> = self.exogenous_columns.clone().unwrap_or_else(|| {
            available_columns
                .iter()
                .filter(|c| **c != self.target_column)
                .cloned()
                .collect()
        });

        FeatureConfig {
            target_column: self.target_column.clone(),
            calendar_features: self.calendar_features.clone(),
            lag_offsets: self.lag_offsets.clone(),
            rolling_windows: self.rolling_windows.clone(),
            lag_columns: self
                .lag_columns
                .clone()
                .unwrap_or_else(|| vec![self.target_column.clone()]),
            rolling_columns: self
                .rolling_columns
                .clone()
                .unwrap_or_else(|| exogenous.clone()),
            exogenous_columns: exogenous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lag_offsets.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(config.write_mode, WriteMode::Overwrite);
    }

    #[test]
    fn test_train_fraction_bounds() {
        for bad in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            let config = PipelineConfig::default().with_train_fraction(bad);
            assert!(config.validate().is_err(), "accepted {}", bad);
        }
        assert!(PipelineConfig::default().with_train_fraction(0.5).validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_lag_and_tiny_window() {
        let config = PipelineConfig::default().with_lag_offsets([0, 1]);
        assert!(config.validate().is_err());

        let config = PipelineConfig::default().with_lag_offsets([]);
        assert!(config.validate().is_err());

        let config = PipelineConfig::default().with_rolling_windows([1, 3]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_target() {
        let config = PipelineConfig::default().with_target("no2");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no2"));
    }

    #[test]
    fn test_rejects_target_as_exogenous_feature() {
        let mut config = PipelineConfig::default();
        config.exogenous_columns = Some(vec![
            "pm25".to_string(),
            "traffic_volume".to_string(),
        ]);
        match config.validate() {
            Err(ForecastError::Configuration { message }) => {
                assert!(message.contains("traffic_volume"))
            }
            other => panic!("expected Configuration error, got {:?}", other),
        }

        config.exogenous_columns = Some(vec!["pm25".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feature_config_defaults() {
        let config = PipelineConfig::default();
        let columns = vec!["traffic_volume".to_string(), "pm25".to_string()];
        let features = config.feature_config(&columns);

        assert_eq!(features.lag_columns, vec!["traffic_volume".to_string()]);
        assert_eq!(features.exogenous_columns, vec!["pm25".to_string()]);
        assert_eq!(features.rolling_columns, vec!["pm25".to_string()]);
    }

    #[test]
    fn test_from_toml_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "target_column = \"pm25\"").unwrap();
        writeln!(file, "lag_offsets = [1, 24, 168]").unwrap();
        writeln!(file, "write_mode = \"append\"").unwrap();
        writeln!(file, "calendar_features = [\"hour\", \"is_weekend\"]").unwrap();

        let config = PipelineConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.target_column, "pm25");
        assert_eq!(
            config.lag_offsets.iter().copied().collect::<Vec<_>>(),
            vec![1, 24, 168]
        );
        assert_eq!(config.write_mode, WriteMode::Append);
        assert_eq!(
            config.calendar_features,
            vec![CalendarFeature::Hour, CalendarFeature::IsWeekend]
        );
        // untouched keys keep their defaults
        assert_eq!(config.train_fraction, DEFAULT_TRAIN_FRACTION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file_rejects_garbage() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "train_fraction = \"most\"").unwrap();
        assert!(matches!(
            PipelineConfig::from_toml_file(file.path()),
            Err(ForecastError::Configuration { .. })
        ));
    }
}
