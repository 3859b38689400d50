//! Application constants for the forecasting pipeline
//!
//! Column names, header aliases, default option values and the names of the
//! artifacts written to the output directory.

// =============================================================================
// Canonical Column Names
// =============================================================================

/// Canonical timestamp column
pub const DATETIME_COLUMN: &str = "datetime";

/// Canonical traffic measurement column
pub const TRAFFIC_VOLUME_COLUMN: &str = "traffic_volume";

/// Canonical PM2.5 measurement column
pub const PM25_COLUMN: &str = "pm25";

// =============================================================================
// Header Aliases
// =============================================================================

/// Header spellings seen in source files, mapped to the canonical names above.
/// Matching is exact (after trimming); the canonical name always wins when a
/// file carries both.
pub mod aliases {
    pub const DATETIME: &[&str] = &["DateTime", "date"];

    pub const TRAFFIC_VOLUME: &[&str] = &["Vehicles", "traffic"];

    pub const PM25: &[&str] = &[
        "PM2.5",
        "PM2_5",
        "PM25",
        "PM2.5 Emissions",
        "PM2.5 Emission",
        "PM2.5_Emissions",
    ];
}

/// Cell spellings read as a missing value, alongside the empty cell
pub const MISSING_VALUE_MARKERS: &[&str] = &[
    "NaN", "nan", "-NaN", "-nan", "NA", "N/A", "n/a", "#N/A", "<NA>", "NULL", "null", "None",
];

// =============================================================================
// Defaults
// =============================================================================

pub const DEFAULT_LAG_OFFSETS: &[usize] = &[1, 2, 3];

pub const DEFAULT_ROLLING_WINDOWS: &[usize] = &[3, 7, 24];

pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

// =============================================================================
// Output Artifacts
// =============================================================================

pub const PREDICTIONS_FILE: &str = "predictions.csv";

pub const METRICS_FILE: &str = "metrics.csv";

/// Chart artifacts live in a subdirectory of the output directory
pub const CHARTS_DIR: &str = "plots";

pub const TREND_CHART_FILE: &str = "trend.svg";

pub const SCATTER_CHART_FILE: &str = "actual_vs_predicted.svg";

pub const HOURLY_CHART_FILE: &str = "hourly_profile.svg";

/// Timestamp format used in every CSV artifact
pub const OUTPUT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Decimal places for floats in CSV artifacts
pub const OUTPUT_FLOAT_PRECISION: usize = 6;

/// Chart canvas size in pixels
pub const CHART_SIZE: (u32, u32) = (1200, 500);

/// SVD singular value cut-offs relative to the largest singular value,
/// tried strictest first
pub const SOLVER_TOLERANCES: &[f64] = &[1e-10, 1e-8, 1e-6];
