//! Scenario tests for the forecast pipeline
//!
//! Each test writes small CSV fixtures into a temporary directory and runs
//! the pipeline against them end to end.

pub mod error_handling;

use crate::config::PipelineConfig;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};

pub fn hour(offset: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 6)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::hours(offset)
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Hourly traffic CSV with a daily shape and a slow upward drift
pub fn traffic_csv(dir: &Path, hours: i64) -> PathBuf {
    let mut content = String::from("datetime,traffic_volume\n");
    for h in 0..hours {
        let volume = 200.0 + 15.0 * (h % 24) as f64 + 0.5 * h as f64;
        content.push_str(&format!("{},{}\n", hour(h).format("%Y-%m-%d %H:%M:%S"), volume));
    }
    write_file(dir, "traffic.csv", &content)
}

/// Hourly PM2.5 CSV using the source-file spelling of the column
pub fn pollution_csv(dir: &Path, hours: i64) -> PathBuf {
    let mut content = String::from("DateTime,PM2.5\n");
    for h in 0..hours {
        let pm25 = 18.0 + (h % 5) as f64 * 1.5;
        content.push_str(&format!("{},{}\n", hour(h).format("%Y-%m-%d %H:%M:%S"), pm25));
    }
    write_file(dir, "pollution.csv", &content)
}

pub fn config_for(output_dir: &Path) -> PipelineConfig {
    PipelineConfig::default()
        .with_output_dir(output_dir)
        .without_charts()
}

/// Data rows of a CSV artifact, header excluded
pub fn data_rows(path: &Path) -> Vec<Vec<String>> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect()
}
