//! Reporter: persists predictions and metrics, renders charts.
//!
//! CSV artifacts are serialized through Polars into memory first so that a
//! run reaches disk in one piece: overwrite goes through a temporary file in
//! the output directory that is renamed over the target, append is a single
//! write. Charts are SVG; a chart that fails to render is logged and
//! collected, never fatal.

use crate::config::{PipelineConfig, WriteMode};
use crate::constants::{
    CHART_SIZE, CHARTS_DIR, HOURLY_CHART_FILE, METRICS_FILE, OUTPUT_FLOAT_PRECISION,
    OUTPUT_TIMESTAMP_FORMAT, PREDICTIONS_FILE, SCATTER_CHART_FILE, TREND_CHART_FILE,
};
use crate::error::{ForecastError, Result};
use crate::models::{EvaluationMetrics, PredictionRecord, TimeSeriesTable};
use crate::summary::hourly_profile;

use plotters::prelude::*;
use polars::prelude::{CsvWriter, DataFrame, SerWriter, df};
use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

type ChartResult = std::result::Result<(), Box<dyn Error>>;

/// Paths written by one [`Reporter::report`] call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportArtifacts {
    pub predictions_path: PathBuf,
    pub metrics_path: PathBuf,
    pub chart_paths: Vec<PathBuf>,
    /// One message per chart that could not be rendered
    pub chart_failures: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Reporter {
    output_dir: PathBuf,
    write_mode: WriteMode,
    render_charts: bool,
}

impl Reporter {
    pub fn new(output_dir: impl Into<PathBuf>, write_mode: WriteMode) -> Self {
        Self {
            output_dir: output_dir.into(),
            write_mode,
            render_charts: true,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            write_mode: config.write_mode,
            render_charts: config.render_charts,
        }
    }

    pub fn without_charts(mut self) -> Self {
        self.render_charts = false;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Persist predictions and metrics, then render charts from the cleaned
    /// table and the predictions.
    ///
    /// Fails only when a CSV artifact cannot be written.
    pub fn report(
        &self,
        predictions: &[PredictionRecord],
        metrics: &EvaluationMetrics,
        table: &TimeSeriesTable,
        target_column: &str,
    ) -> Result<ReportArtifacts> {
        let predictions_path = self.write_predictions(predictions)?;
        let metrics_path = self.write_metrics(metrics)?;

        let (chart_paths, chart_failures) = if self.render_charts {
            self.render_charts(predictions, table, target_column)
        } else {
            debug!("Chart rendering disabled");
            (Vec::new(), Vec::new())
        };

        Ok(ReportArtifacts {
            predictions_path,
            metrics_path,
            chart_paths,
            chart_failures,
        })
    }

    /// Write `timestamp,actual,predicted,residual` rows to the predictions file
    pub fn write_predictions(&self, predictions: &[PredictionRecord]) -> Result<PathBuf> {
        self.ensure_output_dir()?;
        let path = self.output_dir.join(PREDICTIONS_FILE);
        let mut frame = predictions_frame(predictions)?;

        match self.write_mode {
            WriteMode::Overwrite => {
                let bytes = to_csv_bytes(&mut frame, true)?;
                self.replace_file(&path, &bytes)?;
            }
            WriteMode::Append => {
                let needs_header = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
                let bytes = to_csv_bytes(&mut frame, needs_header)?;
                append_file(&path, &bytes)?;
            }
        }

        info!(
            "Wrote {} predictions to {} ({:?})",
            predictions.len(),
            path.display(),
            self.write_mode
        );
        Ok(path)
    }

    /// Write the evaluation metrics as `metric,value` rows.
    ///
    /// Always replaces the previous file: metrics describe the latest run.
    pub fn write_metrics(&self, metrics: &EvaluationMetrics) -> Result<PathBuf> {
        self.ensure_output_dir()?;
        let path = self.output_dir.join(METRICS_FILE);

        let rows = [
            ("mae", format_float(metrics.mae)),
            ("rmse", format_float(metrics.rmse)),
            ("r_squared", format_float(metrics.r_squared)),
            ("train_rows", metrics.train_rows.to_string()),
            ("test_rows", metrics.test_rows.to_string()),
        ];
        let names: Vec<&str> = rows.iter().map(|(name, _)| *name).collect();
        let values: Vec<String> = rows.iter().map(|(_, value)| value.clone()).collect();

        let mut frame = df!("metric" => names, "value" => values)?;
        let bytes = to_csv_bytes(&mut frame, true)?;
        self.replace_file(&path, &bytes)?;

        debug!("Wrote metrics to {}", path.display());
        Ok(path)
    }

    /// Render every chart, returning the written paths and the failures
    pub fn render_charts(
        &self,
        predictions: &[PredictionRecord],
        table: &TimeSeriesTable,
        target_column: &str,
    ) -> (Vec<PathBuf>, Vec<String>) {
        let charts_dir = self.output_dir.join(CHARTS_DIR);
        if let Err(e) = fs::create_dir_all(&charts_dir) {
            let message = ForecastError::Chart {
                path: charts_dir,
                message: e.to_string(),
            }
            .to_string();
            warn!("{}", message);
            return (Vec::new(), vec![message]);
        }

        let trend_path = charts_dir.join(TREND_CHART_FILE);
        let trend = draw_trend(&trend_path, table);
        let scatter_path = charts_dir.join(SCATTER_CHART_FILE);
        let scatter = draw_actual_vs_predicted(&scatter_path, predictions);
        let hourly_path = charts_dir.join(HOURLY_CHART_FILE);
        let hourly = draw_hourly_profile(&hourly_path, table, target_column);

        let mut written = Vec::new();
        let mut failures = Vec::new();
        for (path, outcome) in [(trend_path, trend), (scatter_path, scatter), (hourly_path, hourly)] {
            match outcome {
                Ok(()) => {
                    debug!("Rendered {}", path.display());
                    written.push(path);
                }
                Err(e) => {
                    let message = ForecastError::Chart {
                        path,
                        message: e.to_string(),
                    }
                    .to_string();
                    warn!("{}", message);
                    failures.push(message);
                }
            }
        }

        (written, failures)
    }

    fn ensure_output_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir).map_err(|e| ForecastError::io(&self.output_dir, e))
    }

    /// Write `bytes` to a temporary file next to `path`, then rename it over
    /// `path`
    fn replace_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut temp = NamedTempFile::new_in(&self.output_dir)
            .map_err(|e| ForecastError::io(&self.output_dir, e))?;
        temp.write_all(bytes)
            .map_err(|e| ForecastError::io(temp.path(), e))?;
        temp.persist(path)
            .map_err(|e| ForecastError::io(path, e.error))?;
        Ok(())
    }
}

fn append_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ForecastError::io(path, e))?;
    file.write_all(bytes).map_err(|e| ForecastError::io(path, e))
}

fn predictions_frame(predictions: &[PredictionRecord]) -> Result<DataFrame> {
    let timestamps: Vec<String> = predictions
        .iter()
        .map(|p| p.timestamp.format(OUTPUT_TIMESTAMP_FORMAT).to_string())
        .collect();
    let actual: Vec<Option<f64>> = predictions.iter().map(|p| p.actual).collect();
    let predicted: Vec<f64> = predictions.iter().map(|p| p.predicted).collect();
    let residual: Vec<Option<f64>> = predictions.iter().map(|p| p.residual).collect();

    Ok(df!(
        "timestamp" => timestamps,
        "actual" => actual,
        "predicted" => predicted,
        "residual" => residual
    )?)
}

fn to_csv_bytes(frame: &mut DataFrame, include_header: bool) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    CsvWriter::new(&mut buffer)
        .include_header(include_header)
        .with_float_precision(Some(OUTPUT_FLOAT_PRECISION))
        .finish(frame)?;
    Ok(buffer)
}

fn format_float(value: f64) -> String {
    format!("{:.*}", OUTPUT_FLOAT_PRECISION, value)
}

/// Lower and upper bound of `values`, widened when the range is degenerate
fn padded_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return None;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };
    Some((lo - pad, hi + pad))
}

/// Every measurement column of the cleaned table against time
fn draw_trend(path: &Path, table: &TimeSeriesTable) -> ChartResult {
    let timestamps = table.timestamps();
    let values = table.records().iter().flat_map(|r| r.values.iter().flatten().copied());
    let (y_lo, y_hi) = padded_range(values).ok_or("no values to plot")?;
    let x_hi = timestamps.len().saturating_sub(1).max(1) as f64;

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Measurements over time", ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..x_hi, y_lo..y_hi)?;

    let label_time = |x: &f64| {
        timestamps
            .get(x.round().max(0.0) as usize)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default()
    };
    chart
        .configure_mesh()
        .x_desc("time")
        .x_labels(6)
        .x_label_formatter(&label_time)
        .draw()?;

    for (index, column) in table.columns().iter().enumerate() {
        let color = Palette99::pick(index);
        let points = table
            .records()
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.values[index].map(|v| (i as f64, v)));
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))?
            .label(column.as_str())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], Palette99::pick(index).stroke_width(2))
            });
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Held-out actual values against predictions, with the y = x reference
fn draw_actual_vs_predicted(path: &Path, predictions: &[PredictionRecord]) -> ChartResult {
    let pairs: Vec<(f64, f64)> = predictions
        .iter()
        .filter_map(|p| p.actual.map(|a| (a, p.predicted)))
        .collect();
    let (lo, hi) = padded_range(pairs.iter().flat_map(|(a, p)| [*a, *p]))
        .ok_or("no predictions with known actual values")?;

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Actual vs predicted", ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(lo..hi, lo..hi)?;

    chart
        .configure_mesh()
        .x_desc("actual")
        .y_desc("predicted")
        .draw()?;

    chart.draw_series(LineSeries::new(vec![(lo, lo), (hi, hi)], RED.stroke_width(1)))?;
    chart.draw_series(
        pairs
            .iter()
            .map(|&(a, p)| Circle::new((a, p), 3, BLUE.filled())),
    )?;

    root.present()?;
    Ok(())
}

/// Mean of the target by hour of day
fn draw_hourly_profile(path: &Path, table: &TimeSeriesTable, column: &str) -> ChartResult {
    let profile = hourly_profile(table, column);
    let (y_lo, y_hi) = padded_range(profile.iter().map(|(_, mean)| *mean))
        .ok_or_else(|| format!("no values for column '{}'", column))?;

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Mean {} by hour of day", column), ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..23.0, y_lo..y_hi)?;

    chart.configure_mesh().x_desc("hour").x_labels(24).draw()?;

    let points: Vec<(f64, f64)> = profile.iter().map(|&(h, mean)| (h as f64, mean)).collect();
    chart.draw_series(LineSeries::new(points.clone(), BLUE.stroke_width(2)))?;
    chart.draw_series(points.into_iter().map(|p| Circle::new(p, 3, BLUE.filled())))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    fn ts(hour: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(hour)
    }

    fn predictions() -> Vec<PredictionRecord> {
        vec![
            PredictionRecord::new(ts(8), Some(10.0), 9.5),
            PredictionRecord::new(ts(9), Some(12.0), 12.25),
        ]
    }

    fn metrics() -> EvaluationMetrics {
        EvaluationMetrics {
            mae: 0.375,
            rmse: 0.395285,
            r_squared: 0.84375,
            train_rows: 8,
            test_rows: 2,
        }
    }

    fn table() -> TimeSeriesTable {
        TimeSeriesTable::new(
            vec!["traffic_volume".to_string(), "pm25".to_string()],
            (0..10)
                .map(|h| Record::new(ts(h), vec![Some(h as f64 * 2.0), Some(30.0 - h as f64)]))
                .collect(),
        )
        .unwrap()
    }

    const EXPECTED_ROWS: &str = "2024-03-01 08:00:00,10.000000,9.500000,0.500000\n\
                                 2024-03-01 09:00:00,12.000000,12.250000,-0.250000\n";

    #[test]
    fn test_write_predictions_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = Reporter::new(temp_dir.path().join("out"), WriteMode::Overwrite);

        reporter.write_predictions(&predictions()).unwrap();
        let path = reporter.write_predictions(&predictions()).unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert_eq!(
            content,
            format!("timestamp,actual,predicted,residual\n{}", EXPECTED_ROWS)
        );
    }

    #[test]
    fn test_write_predictions_append_keeps_single_header() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = Reporter::new(temp_dir.path(), WriteMode::Append);

        reporter.write_predictions(&predictions()).unwrap();
        let path = reporter.write_predictions(&predictions()).unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.matches("timestamp,actual").count(), 1);
        assert_eq!(content.lines().count(), 5);
        assert!(content.ends_with(EXPECTED_ROWS));
    }

    #[test]
    fn test_unknown_actual_written_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = Reporter::new(temp_dir.path(), WriteMode::Overwrite);
        let path = reporter
            .write_predictions(&[PredictionRecord::new(ts(0), None, 1.0)])
            .unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("2024-03-01 00:00:00,,1.000000,"));
    }

    #[test]
    fn test_write_metrics() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = Reporter::new(temp_dir.path(), WriteMode::Append);
        let path = reporter.write_metrics(&metrics()).unwrap();
        reporter.write_metrics(&metrics()).unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "metric,value");
        assert_eq!(lines[1], "mae,0.375000");
        assert_eq!(lines[4], "train_rows,8");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_unwritable_output_dir_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not_a_dir");
        fs::write(&blocker, "x").unwrap();

        let reporter = Reporter::new(blocker.join("out"), WriteMode::Overwrite);
        let result = reporter.write_predictions(&predictions());
        assert!(matches!(result, Err(ForecastError::Io { .. })));
    }

    #[test]
    fn test_report_renders_charts() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = Reporter::new(temp_dir.path(), WriteMode::Overwrite);

        let artifacts = reporter
            .report(&predictions(), &metrics(), &table(), "traffic_volume")
            .unwrap();

        assert!(artifacts.chart_failures.is_empty(), "{:?}", artifacts.chart_failures);
        assert_eq!(artifacts.chart_paths.len(), 3);
        for path in &artifacts.chart_paths {
            let svg = fs::read_to_string(path).unwrap();
            assert!(svg.contains("<svg"));
        }
    }

    #[test]
    fn test_chart_failure_does_not_block_predictions() {
        let temp_dir = TempDir::new().unwrap();
        // a plain file where the charts directory should go
        fs::write(temp_dir.path().join(CHARTS_DIR), "x").unwrap();
        let reporter = Reporter::new(temp_dir.path(), WriteMode::Overwrite);

        let artifacts = reporter
            .report(&predictions(), &metrics(), &table(), "traffic_volume")
            .unwrap();

        assert!(artifacts.predictions_path.exists());
        assert!(artifacts.metrics_path.exists());
        assert!(artifacts.chart_paths.is_empty());
        assert_eq!(artifacts.chart_failures.len(), 1);
    }

    #[test]
    fn test_without_charts() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = Reporter::new(temp_dir.path(), WriteMode::Overwrite).without_charts();

        let artifacts = reporter
            .report(&predictions(), &metrics(), &table(), "traffic_volume")
            .unwrap();
        assert!(artifacts.chart_paths.is_empty());
        assert!(!temp_dir.path().join(CHARTS_DIR).exists());
    }

    #[test]
    fn test_padded_range() {
        let (lo, hi) = padded_range([1.0, 3.0].into_iter()).unwrap();
        assert!((lo - 0.9).abs() < 1e-12);
        assert!((hi - 3.1).abs() < 1e-12);
        assert_eq!(padded_range([2.0].into_iter()), Some((1.0, 3.0)));
        assert_eq!(padded_range(std::iter::empty()), None);
    }
}
