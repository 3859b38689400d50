//! Cleaner: duplicate removal, chronological ordering and imputation.
//!
//! Steps, in order:
//! 1. drop rows whose timestamp was already seen (first occurrence in file
//!    order wins)
//! 2. stable sort ascending by timestamp
//! 3. forward-fill each missing value from the previous row
//! 4. fill leading gaps (no previous value) with the column mean over the
//!    observed values
//!
//! Sorting before filling makes "previous" mean chronologically previous.

use crate::error::{ForecastError, Result};
use crate::models::{CleaningReport, Record, TimeSeriesTable};
use std::collections::HashSet;
use tracing::{debug, info};

/// Produce a cleaned copy of `table` and the counts of what changed
pub fn clean(table: &TimeSeriesTable) -> Result<(TimeSeriesTable, CleaningReport)> {
    let mut report = CleaningReport {
        rows_in: table.len(),
        ..Default::default()
    };

    let mut records = drop_duplicate_timestamps(table.records());
    report.duplicates_dropped = table.len() - records.len();

    records.sort_by_key(|r| r.timestamp);

    if records.is_empty() {
        return Err(ForecastError::empty_table("cleaning"));
    }

    for (index, column) in table.columns().iter().enumerate() {
        let (forward, mean) = impute_column(&mut records, index, column)?;
        report.forward_filled += forward;
        report.mean_filled += mean;
    }

    report.rows_out = records.len();
    info!(
        "Cleaned {} rows: {} duplicates dropped, {} values forward-filled, {} mean-filled",
        report.rows_in, report.duplicates_dropped, report.forward_filled, report.mean_filled
    );

    Ok((table.with_records(records), report))
}

/// Keep the first record for each timestamp, preserving input order
fn drop_duplicate_timestamps(records: &[Record]) -> Vec<Record> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .filter(|r| seen.insert(r.timestamp))
        .cloned()
        .collect()
}

/// Forward-fill then mean-fill one column in place.
///
/// Returns the number of forward-filled and mean-filled values.
fn impute_column(records: &mut [Record], index: usize, column: &str) -> Result<(usize, usize)> {
    let observed: Vec<f64> = records.iter().filter_map(|r| r.values[index]).collect();
    if observed.is_empty() {
        return Err(ForecastError::EmptyColumn {
            column: column.to_string(),
        });
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;

    let mut forward = 0;
    let mut leading = 0;
    let mut previous: Option<f64> = None;

    for record in records.iter_mut() {
        match record.values[index] {
            Some(value) => previous = Some(value),
            None => match previous {
                Some(value) => {
                    record.values[index] = Some(value);
                    forward += 1;
                }
                None => {
                    record.values[index] = Some(mean);
                    leading += 1;
                }
            },
        }
    }

    if forward + leading > 0 {
        debug!(
            "Column '{}': {} forward-filled, {} mean-filled (mean {:.4})",
            column, forward, leading, mean
        );
    }
    Ok((forward, leading))
}
