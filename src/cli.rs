//! Command-line interface components.

use crate::config::{PipelineConfig, WriteMode};
use crate::error::Result;
use crate::pipeline::PipelineInputs;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "traffic-forecast")]
#[command(about = "Clean traffic and emission CSVs, build lag features and fit a baseline forecast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// CSV with the timestamp column and the traffic measurements
    #[arg(value_name = "TRAFFIC_CSV")]
    pub traffic: PathBuf,

    /// CSV with PM2.5 measurements, joined to the traffic data on timestamp
    #[arg(value_name = "POLLUTION_CSV")]
    pub pollution: Option<PathBuf>,

    /// TOML configuration file; command-line options override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for predictions, metrics and charts
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Column to forecast
    #[arg(short, long)]
    pub target: Option<String>,

    /// Share of feature rows used for training
    #[arg(long, value_name = "FRACTION")]
    pub train_fraction: Option<f64>,

    /// Lag offsets in periods, comma-separated
    #[arg(long, value_delimiter = ',', value_name = "LIST")]
    pub lags: Option<Vec<usize>>,

    /// Rolling window sizes in periods, comma-separated
    #[arg(long, value_delimiter = ',', value_name = "LIST")]
    pub windows: Option<Vec<usize>>,

    /// Append predictions to an existing file instead of replacing it
    #[arg(long)]
    pub append: bool,

    /// Read ambiguous dates such as 01/11/2015 as day/month
    #[arg(long)]
    pub day_first: bool,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,

    /// Load, clean and summarize the data then exit (no model fitting)
    #[arg(long)]
    pub describe_only: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn inputs(&self) -> PipelineInputs {
        let inputs = PipelineInputs::new(&self.traffic);
        match &self.pollution {
            Some(path) => inputs.with_pollution(path),
            None => inputs,
        }
    }

    /// Defaults, then the config file if one was given, then command-line
    /// overrides
    pub fn load_configuration(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Using config file: {}", path.display());
                PipelineConfig::from_toml_file(path)?
            }
            None => PipelineConfig::default(),
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        if let Some(target) = &self.target {
            config.target_column = target.clone();
        }
        if let Some(train_fraction) = self.train_fraction {
            config.train_fraction = train_fraction;
        }
        if let Some(lags) = &self.lags {
            config.lag_offsets = lags.iter().copied().collect();
        }
        if let Some(windows) = &self.windows {
            config.rolling_windows = windows.iter().copied().collect();
        }
        if self.append {
            config.write_mode = WriteMode::Append;
        }
        if self.day_first {
            config.day_first = true;
        }
        if self.no_charts {
            config.render_charts = false;
        }
    }
}
