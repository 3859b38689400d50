//! Forecast pipeline orchestration.
//!
//! Runs the stages as a strict linear sequence: Load, Clean, BuildFeatures,
//! FitPredict, Report. Every stage reads the previous stage's output and
//! produces a new value; nothing is shared between runs, so the same inputs
//! and configuration always produce the same artifacts. The first failing
//! stage aborts the run with its own error.

use crate::cleaner::clean;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::features::build_features;
use crate::loader::{DatasetSpec, LoadSummary, load_pair};
use crate::model::fit_and_evaluate;
use crate::models::{RunStats, TimeSeriesTable};
use crate::reporter::Reporter;
use crate::summary::{DatasetSummary, describe};

use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

#[cfg(test)]
pub mod tests;

const STAGES: u64 = 5;

/// Source files for one run
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub traffic: PathBuf,
    pub pollution: Option<PathBuf>,
}

impl PipelineInputs {
    pub fn new(traffic: impl Into<PathBuf>) -> Self {
        Self {
            traffic: traffic.into(),
            pollution: None,
        }
    }

    pub fn with_pollution(mut self, pollution: impl Into<PathBuf>) -> Self {
        self.pollution = Some(pollution.into());
        self
    }
}

/// Linear Load → Clean → BuildFeatures → FitPredict → Report pipeline
#[derive(Debug, Clone)]
pub struct ForecastPipeline {
    config: PipelineConfig,
    show_progress: bool,
}

impl ForecastPipeline {
    /// Create a pipeline; the configuration is validated here so a bad option
    /// never reaches a stage
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            show_progress: false,
        })
    }

    /// Show a progress bar over the stages
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load stage: read and merge the source files
    pub fn load(&self, inputs: &PipelineInputs) -> Result<(TimeSeriesTable, LoadSummary)> {
        let traffic = DatasetSpec::new(
            &inputs.traffic,
            &self.config.timestamp_column,
            self.config.traffic_columns.clone(),
        )
        .with_day_first(self.config.day_first);
        let pollution = inputs.pollution.as_ref().map(|path| {
            DatasetSpec::new(
                path,
                &self.config.timestamp_column,
                self.config.pollution_columns.clone(),
            )
            .with_day_first(self.config.day_first)
        });

        load_pair(
            &traffic,
            pollution.as_ref(),
            self.config.align_missing_timestamps,
        )
    }

    /// Load and clean, then summarize the cleaned table
    pub fn describe(&self, inputs: &PipelineInputs) -> Result<DatasetSummary> {
        let (table, _) = self.load(inputs)?;
        let (cleaned, _) = clean(&table)?;
        Ok(describe(&cleaned, &self.config.target_column))
    }

    /// Run every stage and persist the artifacts
    pub fn run(&self, inputs: &PipelineInputs) -> Result<RunStats> {
        let start_time = Instant::now();
        let progress = self.progress_bar();
        let mut stats = RunStats::default();

        progress.set_message("Loading");
        let (table, load_summary) = self.load(inputs)?;
        stats.rows_read = load_summary.rows_read();
        stats.rows_dropped = load_summary.rows_dropped();
        stats.rows_unmatched = load_summary.rows_unmatched;
        info!(
            "Loaded {} rows ({} read, {} dropped, {} unmatched)",
            table.len(),
            stats.rows_read,
            stats.rows_dropped,
            stats.rows_unmatched
        );
        progress.inc(1);

        progress.set_message("Cleaning");
        let (cleaned, cleaning) = clean(&table)?;
        stats.duplicates_dropped = cleaning.duplicates_dropped;
        stats.values_imputed = cleaning.values_imputed();
        progress.inc(1);

        progress.set_message("Building features");
        let feature_config = self.config.feature_config(cleaned.columns());
        debug!("Feature configuration: {:?}", feature_config);
        let matrix = build_features(&cleaned, &feature_config)?;
        stats.feature_rows = matrix.len();
        progress.inc(1);

        progress.set_message("Fitting model");
        let run = fit_and_evaluate(&matrix, self.config.train_fraction)?;
        for (name, coefficient) in run.model.named_coefficients() {
            debug!("  {:<28} {:>12.6}", name, coefficient);
        }
        stats.metrics = Some(run.metrics);
        progress.inc(1);

        progress.set_message("Writing reports");
        let artifacts = Reporter::from_config(&self.config).report(
            &run.predictions,
            &run.metrics,
            &cleaned,
            &self.config.target_column,
        )?;
        stats.predictions_path = Some(artifacts.predictions_path);
        stats.metrics_path = Some(artifacts.metrics_path);
        stats.chart_paths = artifacts.chart_paths;
        stats.chart_failures = artifacts.chart_failures;
        progress.inc(1);

        progress.finish_with_message("Forecast complete");
        stats.processing_time_ms = start_time.elapsed().as_millis();
        info!("Pipeline finished in {} ms", stats.processing_time_ms);
        Ok(stats)
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(STAGES);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb
    }
}
