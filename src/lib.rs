//! Traffic Forecast Library
//!
//! A batch pipeline for hourly city traffic and vehicle emission data:
//! load one or two CSV sources into a time-indexed table, clean it, derive
//! calendar, lag and rolling-window features, and fit a baseline linear
//! forecast evaluated on a chronological hold-out.
//!
//! This library provides tools for:
//! - Loading CSVs with header alias normalization and row-level error reporting
//! - Joining traffic and pollution sources on timestamp
//! - Removing duplicate timestamps and imputing missing values
//! - Building leakage-free lag and rolling features with a named schema
//! - Fitting ordinary least squares and scoring MAE, RMSE and R²
//! - Writing prediction and metric CSVs and SVG charts

pub mod cleaner;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod features;
pub mod loader;
pub mod model;
pub mod models;
pub mod pipeline;
pub mod reporter;
pub mod summary;
pub mod timestamp;

// Re-export commonly used types
pub use config::{PipelineConfig, WriteMode};
pub use error::{ForecastError, Result};
pub use features::{CalendarFeature, FeatureMatrix, FeatureSchema};
pub use model::LinearModel;
pub use models::{EvaluationMetrics, PredictionRecord, Record, RunStats, TimeSeriesTable};
pub use pipeline::{ForecastPipeline, PipelineInputs};
