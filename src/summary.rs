//! Descriptive statistics for a loaded or cleaned table.

use crate::models::TimeSeriesTable;
use chrono::{NaiveDateTime, Timelike};

/// Statistics for one measurement column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub count: usize,
    pub missing: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl ColumnSummary {
    pub fn missing_percent(&self) -> f64 {
        let total = self.count + self.missing;
        if total == 0 {
            0.0
        } else {
            self.missing as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub rows: usize,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub columns: Vec<ColumnSummary>,
    /// Hour-of-day means of the profiled column
    pub hourly_profile: Vec<(u32, f64)>,
    /// Pearson correlations, indexed like `columns`
    pub correlations: Vec<Vec<f64>>,
}

/// Summarize every column of `table`, with the hourly profile of
/// `profile_column`
pub fn describe(table: &TimeSeriesTable, profile_column: &str) -> DatasetSummary {
    let timestamps = table.timestamps();
    let columns = table
        .columns()
        .iter()
        .map(|name| {
            let values = table.column_values(name).unwrap_or_default();
            let observed: Vec<f64> = values.iter().filter_map(|v| *v).collect();
            let count = observed.len();
            let (mean, min, max) = if count == 0 {
                (f64::NAN, f64::NAN, f64::NAN)
            } else {
                (
                    observed.iter().sum::<f64>() / count as f64,
                    observed.iter().copied().fold(f64::INFINITY, f64::min),
                    observed.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                )
            };
            ColumnSummary {
                name: name.clone(),
                count,
                missing: values.len() - count,
                mean,
                min,
                max,
            }
        })
        .collect();

    DatasetSummary {
        rows: table.len(),
        start: timestamps.iter().min().copied(),
        end: timestamps.iter().max().copied(),
        columns,
        hourly_profile: hourly_profile(table, profile_column),
        correlations: correlation_matrix(table),
    }
}

/// Mean of `column` for each hour of day that has observations
pub fn hourly_profile(table: &TimeSeriesTable, column: &str) -> Vec<(u32, f64)> {
    let Some(index) = table.column_index(column) else {
        return Vec::new();
    };

    let mut sums = [0.0f64; 24];
    let mut counts = [0usize; 24];
    for record in table.records() {
        if let Some(value) = record.values[index] {
            let hour = record.timestamp.hour() as usize;
            sums[hour] += value;
            counts[hour] += 1;
        }
    }

    (0..24)
        .filter(|&h| counts[h] > 0)
        .map(|h| (h as u32, sums[h] / counts[h] as f64))
        .collect()
}

/// Pearson correlation between every pair of columns, over rows where both
/// values are present. Undefined pairs (fewer than two rows, zero variance)
/// are NaN.
pub fn correlation_matrix(table: &TimeSeriesTable) -> Vec<Vec<f64>> {
    let width = table.columns().len();
    let mut matrix = vec![vec![f64::NAN; width]; width];

    for i in 0..width {
        for j in i..width {
            let pairs: Vec<(f64, f64)> = table
                .records()
                .iter()
                .filter_map(|r| Some((r.values[i]?, r.values[j]?)))
                .collect();
            let r = pearson(&pairs);
            matrix[i][j] = r;
            matrix[j][i] = r;
        }
    }
    matrix
}

fn pearson(pairs: &[(f64, f64)]) -> f64 {
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        sxy += (x - mean_x) * (y - mean_y);
        sxx += (x - mean_x).powi(2);
        syy += (y - mean_y).powi(2);
    }

    if sxx == 0.0 || syy == 0.0 {
        f64::NAN
    } else {
        sxy / (sxx * syy).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use chrono::{Duration, NaiveDate};

    fn sample() -> TimeSeriesTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rows = [
            (0, Some(10.0), Some(1.0)),
            (1, Some(20.0), None),
            (24, Some(30.0), Some(3.0)),
            (25, None, Some(4.0)),
        ];
        TimeSeriesTable::new(
            vec!["traffic_volume".to_string(), "pm25".to_string()],
            rows.iter()
                .map(|(h, a, b)| Record::new(start + Duration::hours(*h), vec![*a, *b]))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_describe() {
        let summary = describe(&sample(), "traffic_volume");
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.start.unwrap().to_string(), "2024-01-01 00:00:00");
        assert_eq!(summary.end.unwrap().to_string(), "2024-01-02 01:00:00");

        let traffic = &summary.columns[0];
        assert_eq!(traffic.count, 3);
        assert_eq!(traffic.missing, 1);
        assert_eq!(traffic.mean, 20.0);
        assert_eq!(traffic.min, 10.0);
        assert_eq!(traffic.max, 30.0);
        assert_eq!(traffic.missing_percent(), 25.0);

        assert_eq!(summary.hourly_profile.len(), 2);
        assert_eq!(summary.correlations.len(), 2);
    }

    #[test]
    fn test_hourly_profile() {
        let profile = hourly_profile(&sample(), "traffic_volume");
        assert_eq!(profile, vec![(0, 20.0), (1, 20.0)]);
        assert!(hourly_profile(&sample(), "no2").is_empty());
    }

    #[test]
    fn test_correlation_matrix() {
        let matrix = correlation_matrix(&sample());
        assert_eq!(matrix.len(), 2);
        assert!((matrix[0][0] - 1.0).abs() < 1e-12);
        // only rows 0 and 2 have both values: a perfect positive line
        assert!((matrix[0][1] - 1.0).abs() < 1e-12);
        assert_eq!(matrix[0][1], matrix[1][0]);
    }

    #[test]
    fn test_pearson_degenerate() {
        assert!(pearson(&[(1.0, 2.0)]).is_nan());
        assert!(pearson(&[(1.0, 2.0), (1.0, 3.0)]).is_nan());
    }
}
