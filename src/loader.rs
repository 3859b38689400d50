//! Data Loader: CSV sources into time-indexed tables.
//!
//! Files are read with polars with every column kept as a string, so that
//! timestamp and number parsing (and the row-level error reporting that
//! comes with it) happen here rather than inside schema inference.
//!
//! A row whose timestamp or numeric value cannot be parsed is reported as a
//! [`RowIssue`] and dropped; the load only fails when a required column is
//! absent or no row survives.

use crate::constants::{
    DATETIME_COLUMN, MISSING_VALUE_MARKERS, PM25_COLUMN, TRAFFIC_VOLUME_COLUMN, aliases,
};
use crate::error::{ForecastError, Result};
use crate::models::{LoadReport, Record, RowIssue, TimeSeriesTable};
use crate::timestamp::parse_timestamp;
use chrono::NaiveDateTime;
use polars::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What to read from one source file
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    pub path: PathBuf,
    pub timestamp_column: String,
    pub value_columns: Vec<String>,
    /// Read ambiguous slash and dash dates as day/month
    pub day_first: bool,
}

impl DatasetSpec {
    pub fn new(
        path: impl Into<PathBuf>,
        timestamp_column: impl Into<String>,
        value_columns: Vec<String>,
    ) -> Self {
        Self {
            path: path.into(),
            timestamp_column: timestamp_column.into(),
            value_columns,
            day_first: false,
        }
    }

    pub fn with_day_first(mut self, day_first: bool) -> Self {
        self.day_first = day_first;
        self
    }
}

/// Load reports for every source that went into a merged table
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub reports: Vec<LoadReport>,
    /// Rows lost because their timestamp had no partner in the other file
    pub rows_unmatched: usize,
}

impl LoadSummary {
    pub fn rows_read(&self) -> usize {
        self.reports.iter().map(|r| r.rows_read).sum()
    }

    pub fn rows_dropped(&self) -> usize {
        self.reports.iter().map(|r| r.rows_dropped()).sum()
    }

    pub fn issue_count(&self) -> usize {
        self.reports.iter().map(|r| r.issues.len()).sum()
    }
}

/// Load one CSV into a table ordered as in the file
pub fn load_csv(spec: &DatasetSpec) -> Result<(TimeSeriesTable, LoadReport)> {
    let source = RawSource::read(&spec.path)?;
    load_timed(&source, spec)
}

fn load_timed(source: &RawSource, spec: &DatasetSpec) -> Result<(TimeSeriesTable, LoadReport)> {
    let timestamp_column = source.require(&spec.timestamp_column)?;
    let timestamps = source.strings(&timestamp_column)?;

    let (table, report) = source.build_table(spec, source.height(), |row| {
        let raw = timestamps[row].unwrap_or_default();
        parse_timestamp(raw, spec.day_first).ok_or_else(|| RowIssue {
            row: row + 1,
            column: spec.timestamp_column.clone(),
            value: raw.to_string(),
            reason: "unparseable timestamp".to_string(),
        })
    })?;

    info!(
        "Loaded {} of {} rows from {} ({} dropped)",
        report.rows_loaded,
        report.rows_read,
        spec.path.display(),
        report.rows_dropped()
    );
    Ok((table, report))
}

/// Load the traffic file and, when given, the pollution file, inner-joined
/// on timestamp.
///
/// A pollution file without a timestamp column borrows the traffic table's
/// chronologically sorted timestamps position by position when
/// `align_missing_timestamps` is set.
pub fn load_pair(
    traffic: &DatasetSpec,
    pollution: Option<&DatasetSpec>,
    align_missing_timestamps: bool,
) -> Result<(TimeSeriesTable, LoadSummary)> {
    let (traffic_table, traffic_report) = load_csv(traffic)?;
    let mut summary = LoadSummary {
        reports: vec![traffic_report],
        rows_unmatched: 0,
    };

    let Some(pollution) = pollution else {
        return Ok((traffic_table, summary));
    };

    let source = RawSource::read(&pollution.path)?;
    let (pollution_table, pollution_report) = match source.resolve(&pollution.timestamp_column) {
        Some(_) => load_timed(&source, pollution)?,
        None if align_missing_timestamps => {
            let mut sorted = traffic_table.timestamps();
            sorted.sort();
            info!(
                "{} has no '{}' column, aligning to traffic timestamps",
                pollution.path.display(),
                pollution.timestamp_column
            );
            align_to_timestamps(&source, pollution, &sorted)?
        }
        None => {
            return Err(ForecastError::missing_column(
                &pollution.timestamp_column,
                &pollution.path,
            ));
        }
    };

    let (merged, unmatched) = inner_join(&traffic_table, &pollution_table)?;
    summary.reports.push(pollution_report);
    summary.rows_unmatched = unmatched;

    if merged.is_empty() {
        return Err(ForecastError::empty_table("merging traffic and pollution data"));
    }

    info!(
        "Merged {} traffic rows with {} pollution rows into {} rows",
        traffic_table.len(),
        pollution_table.len(),
        merged.len()
    );
    Ok((merged, summary))
}

/// Pair value rows with externally supplied timestamps, truncating to the
/// shorter of the two
fn align_to_timestamps(
    source: &RawSource,
    spec: &DatasetSpec,
    timestamps: &[NaiveDateTime],
) -> Result<(TimeSeriesTable, LoadReport)> {
    let rows = source.height().min(timestamps.len());
    if rows < source.height() {
        debug!(
            "Truncating {} to {} rows to match traffic timestamps",
            spec.path.display(),
            rows
        );
    }

    let (table, mut report) = source.build_table(spec, rows, |row| Ok(timestamps[row]))?;
    report.timestamps_aligned = true;
    Ok((table, report))
}

/// Inner join on timestamp. Left row order is kept; a right timestamp that
/// repeats joins on its first occurrence.
fn inner_join(left: &TimeSeriesTable, right: &TimeSeriesTable) -> Result<(TimeSeriesTable, usize)> {
    if let Some(shared) = right.columns().iter().find(|c| left.column_index(c).is_some()) {
        return Err(ForecastError::configuration(format!(
            "column '{}' appears in both source files",
            shared
        )));
    }

    let mut right_index: HashMap<NaiveDateTime, usize> = HashMap::new();
    for (i, record) in right.records().iter().enumerate() {
        right_index.entry(record.timestamp).or_insert(i);
    }

    let mut records = Vec::with_capacity(left.len().min(right.len()));
    let mut unmatched = 0;
    for record in left.records() {
        match right_index.get(&record.timestamp) {
            Some(&i) => {
                let mut values = record.values.clone();
                values.extend(right.records()[i].values.iter().copied());
                records.push(Record::new(record.timestamp, values));
            }
            None => unmatched += 1,
        }
    }

    let mut columns = left.columns().to_vec();
    columns.extend(right.columns().iter().cloned());
    debug!("Inner join left {} traffic rows unmatched", unmatched);
    Ok((TimeSeriesTable::new(columns, records)?, unmatched))
}

/// A CSV read entirely as strings, with header aliases resolved
struct RawSource {
    path: PathBuf,
    frame: DataFrame,
    /// canonical or literal column name -> header in the file
    headers: HashMap<String, String>,
}

impl RawSource {
    fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ForecastError::DatasetNotFound {
                path: path.to_path_buf(),
            });
        }

        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;

        let names: Vec<String> = frame
            .get_column_names()
            .iter()
            .map(|name| name.as_str().to_string())
            .collect();
        let headers = resolve_headers(&names);
        debug!("Columns in {}: {:?}", path.display(), names);

        Ok(Self {
            path: path.to_path_buf(),
            frame,
            headers,
        })
    }

    fn resolve(&self, column: &str) -> Option<&String> {
        self.headers.get(column)
    }

    fn require(&self, column: &str) -> Result<String> {
        self.resolve(column)
            .cloned()
            .ok_or_else(|| ForecastError::missing_column(column, &self.path))
    }

    fn height(&self) -> usize {
        self.frame.height()
    }

    fn strings(&self, header: &str) -> Result<Vec<Option<&str>>> {
        let values = self.frame.column(header)?.as_materialized_series().str()?;
        Ok(values.into_iter().collect())
    }

    /// Parse the first `rows` rows with `timestamp_for`, keeping rows whose
    /// timestamp and values all parse. Blank numeric cells become missing
    /// values.
    fn build_table<F>(
        &self,
        spec: &DatasetSpec,
        rows: usize,
        timestamp_for: F,
    ) -> Result<(TimeSeriesTable, LoadReport)>
    where
        F: Fn(usize) -> std::result::Result<NaiveDateTime, RowIssue>,
    {
        let mut value_columns = Vec::with_capacity(spec.value_columns.len());
        for column in &spec.value_columns {
            let header = self.require(column)?;
            value_columns.push((column.as_str(), self.strings(&header)?));
        }

        let rows_read = rows;
        let mut records = Vec::with_capacity(rows_read);
        let mut issues = Vec::new();

        for row in 0..rows_read {
            let parsed = timestamp_for(row).and_then(|timestamp| {
                let mut values = Vec::with_capacity(value_columns.len());
                for (column, cells) in &value_columns {
                    values.push(parse_value(cells[row]).map_err(|value| RowIssue {
                        row: row + 1,
                        column: column.to_string(),
                        value,
                        reason: "not a number".to_string(),
                    })?);
                }
                Ok(Record::new(timestamp, values))
            });

            match parsed {
                Ok(record) => records.push(record),
                Err(issue) => {
                    warn!(
                        "{}",
                        ForecastError::Parse {
                            path: self.path.clone(),
                            row: issue.row,
                            message: format!(
                                "{} '{}' in column '{}'",
                                issue.reason, issue.value, issue.column
                            ),
                        }
                    );
                    issues.push(issue);
                }
            }
        }

        if records.is_empty() {
            return Err(ForecastError::empty_table(format!(
                "loading {}",
                self.path.display()
            )));
        }

        let report = LoadReport {
            path: self.path.clone(),
            rows_read,
            rows_loaded: records.len(),
            issues,
            timestamps_aligned: false,
        };
        let table = TimeSeriesTable::new(spec.value_columns.clone(), records)?;
        Ok((table, report))
    }
}

/// Blank cells, NA markers and non-finite numbers are missing; anything else
/// must parse as a finite number
fn parse_value(cell: Option<&str>) -> std::result::Result<Option<f64>, String> {
    match cell.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) if MISSING_VALUE_MARKERS.contains(&text) => Ok(None),
        Some(text) => match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            Ok(_) => Ok(None),
            Err(_) => Err(text.to_string()),
        },
    }
}

/// Map canonical names to the headers present in a file. Literal headers are
/// always addressable by their own name; an alias only fills a canonical name
/// the file does not already carry.
fn resolve_headers(names: &[String]) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = names
        .iter()
        .map(|name| (name.trim().to_string(), name.clone()))
        .collect();

    let canonical: [(&str, &[&str]); 3] = [
        (DATETIME_COLUMN, aliases::DATETIME),
        (TRAFFIC_VOLUME_COLUMN, aliases::TRAFFIC_VOLUME),
        (PM25_COLUMN, aliases::PM25),
    ];

    for (name, candidates) in canonical {
        if headers.contains_key(name) {
            continue;
        }
        if let Some(found) = candidates
            .iter()
            .find_map(|alias| names.iter().find(|n| n.trim() == *alias))
        {
            debug!("Using column '{}' as '{}'", found, name);
            headers.insert(name.to_string(), found.clone());
        }
    }

    headers
}
