//! Pipeline failure modes

use super::{config_for, hour, traffic_csv, write_file};
use crate::constants::PREDICTIONS_FILE;
use crate::error::ForecastError;
use crate::pipeline::{ForecastPipeline, PipelineInputs};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_nonexistent_traffic_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.csv");

    let pipeline = ForecastPipeline::new(config_for(temp_dir.path())).unwrap();
    let result = pipeline.run(&PipelineInputs::new(&missing));

    match result.unwrap_err() {
        ForecastError::DatasetNotFound { path } => assert_eq!(path, missing),
        other => panic!("Expected DatasetNotFound error, got {:?}", other),
    }
}

#[test]
fn test_missing_target_column_aborts() {
    let temp_dir = TempDir::new().unwrap();
    let traffic = write_file(
        temp_dir.path(),
        "traffic.csv",
        "datetime,speed\n2024-05-06 00:00:00,40\n2024-05-06 01:00:00,42\n",
    );

    let pipeline = ForecastPipeline::new(config_for(temp_dir.path())).unwrap();
    match pipeline.run(&PipelineInputs::new(&traffic)).unwrap_err() {
        ForecastError::MissingColumn { column, path } => {
            assert_eq!(column, "traffic_volume");
            assert_eq!(path, traffic);
        }
        other => panic!("Expected MissingColumn error, got {:?}", other),
    }
    assert!(!temp_dir.path().join(PREDICTIONS_FILE).exists());
}

#[test]
fn test_invalid_configuration_rejected_up_front() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_for(temp_dir.path()).with_train_fraction(1.0);
    assert!(matches!(
        ForecastPipeline::new(config),
        Err(ForecastError::Configuration { .. })
    ));

    let config = config_for(temp_dir.path()).with_target("no2");
    assert!(matches!(
        ForecastPipeline::new(config),
        Err(ForecastError::Configuration { .. })
    ));
}

#[test]
fn test_bad_rows_are_dropped_and_counted() {
    let temp_dir = TempDir::new().unwrap();
    let mut content = String::from("datetime,traffic_volume\n");
    for h in 0..20 {
        content.push_str(&format!("{},{}\n", hour(h).format("%Y-%m-%d %H:%M:%S"), 100 + h));
    }
    content.push_str("not a time,50\n");
    content.push_str("2024-05-07 00:00:00,lots\n");
    let traffic = write_file(temp_dir.path(), "traffic.csv", &content);

    let stats = ForecastPipeline::new(config_for(temp_dir.path()))
        .unwrap()
        .run(&PipelineInputs::new(traffic))
        .unwrap();

    assert_eq!(stats.rows_read, 22);
    assert_eq!(stats.rows_dropped, 2);
    assert_eq!(stats.feature_rows, 17);
}

#[test]
fn test_too_few_rows_for_history() {
    let temp_dir = TempDir::new().unwrap();
    let traffic = traffic_csv(temp_dir.path(), 3);

    let result = ForecastPipeline::new(config_for(temp_dir.path()))
        .unwrap()
        .run(&PipelineInputs::new(traffic));

    assert!(matches!(
        result,
        Err(ForecastError::InsufficientData { available: 3, .. })
    ));
}

#[test]
fn test_every_row_unparseable() {
    let temp_dir = TempDir::new().unwrap();
    let traffic = write_file(
        temp_dir.path(),
        "traffic.csv",
        "datetime,traffic_volume\nyesterday,1\ntoday,2\n",
    );

    let result = ForecastPipeline::new(config_for(temp_dir.path()))
        .unwrap()
        .run(&PipelineInputs::new(traffic));
    assert!(matches!(result, Err(ForecastError::EmptyTable { .. })));
}

#[test]
fn test_target_without_observations() {
    let temp_dir = TempDir::new().unwrap();
    let mut content = String::from("datetime,traffic_volume\n");
    for h in 0..10 {
        content.push_str(&format!("{},\n", hour(h).format("%Y-%m-%d %H:%M:%S")));
    }
    let traffic = write_file(temp_dir.path(), "traffic.csv", &content);

    let result = ForecastPipeline::new(config_for(temp_dir.path()))
        .unwrap()
        .run(&PipelineInputs::new(traffic));
    assert!(matches!(result, Err(ForecastError::EmptyColumn { .. })));
}

#[test]
fn test_unwritable_output_directory() {
    let temp_dir = TempDir::new().unwrap();
    let traffic = traffic_csv(temp_dir.path(), 30);
    let blocker = temp_dir.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();

    let result = ForecastPipeline::new(config_for(&blocker.join("out")))
        .unwrap()
        .run(&PipelineInputs::new(traffic));
    assert!(matches!(result, Err(ForecastError::Io { .. })));
}
