use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::process;
use traffic_forecast::cli::Args;
use traffic_forecast::summary::DatasetSummary;
use traffic_forecast::{ForecastPipeline, PipelineConfig, RunStats};

fn main() {
    let args = Args::parse();
    setup_logging(&args);

    if let Err(error) = run(&args) {
        eprintln!("Error: {:#}", error);
        process::exit(1);
    }
}

fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("traffic_forecast={}", args.get_log_level())));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run(args: &Args) -> Result<()> {
    let config = args
        .load_configuration()
        .context("Failed to load configuration")?;
    let inputs = args.inputs();
    let pipeline = ForecastPipeline::new(config.clone())?.with_progress(true);

    println!("{}", "Traffic forecast".bright_green().bold());
    println!("  {} {}", "Traffic:".bright_cyan(), inputs.traffic.display());
    if let Some(pollution) = &inputs.pollution {
        println!("  {} {}", "Pollution:".bright_cyan(), pollution.display());
    }

    if args.describe_only {
        let summary = pipeline
            .describe(&inputs)
            .context("Failed to summarize the input data")?;
        print_description(&summary, &config.target_column);
        return Ok(());
    }

    let stats = pipeline.run(&inputs).context("Forecast run failed")?;
    print_run_summary(&stats, &config);
    Ok(())
}

fn print_description(summary: &DatasetSummary, target_column: &str) {
    println!("\n{}", "Dataset summary".bright_yellow());
    println!("  {} {}", "Rows:".bright_cyan(), summary.rows);
    if let (Some(start), Some(end)) = (summary.start, summary.end) {
        println!("  {} {} to {}", "Range:".bright_cyan(), start, end);
    }

    println!(
        "\n  {:<18} {:>8} {:>9} {:>12} {:>12} {:>12}",
        "column", "count", "missing", "mean", "min", "max"
    );
    for column in &summary.columns {
        println!(
            "  {:<18} {:>8} {:>8.1}% {:>12.3} {:>12.3} {:>12.3}",
            column.name,
            column.count,
            column.missing_percent(),
            column.mean,
            column.min,
            column.max
        );
    }

    if !summary.hourly_profile.is_empty() {
        println!("\n{} {}", "Mean by hour:".bright_yellow(), target_column);
        for (hour, mean) in &summary.hourly_profile {
            println!("  {:02}:00 {:>12.3}", hour, mean);
        }
    }

    if summary.columns.len() > 1 {
        println!("\n{}", "Correlations".bright_yellow());
        for (column, row) in summary.columns.iter().zip(&summary.correlations) {
            let cells: Vec<String> = row.iter().map(|r| format!("{:>8.3}", r)).collect();
            println!("  {:<18} {}", column.name, cells.join(" "));
        }
    }
}

fn print_run_summary(stats: &RunStats, config: &PipelineConfig) {
    println!("\n{}", "Run complete".bright_green().bold());
    println!(
        "  {} {} read, {} dropped, {} unmatched, {} duplicates",
        "Rows:".bright_cyan(),
        stats.rows_read.to_string().bright_white().bold(),
        stats.rows_dropped,
        stats.rows_unmatched,
        stats.duplicates_dropped
    );
    println!("  {} {}", "Values imputed:".bright_cyan(), stats.values_imputed);
    println!("  {} {}", "Feature rows:".bright_cyan(), stats.feature_rows);

    if let Some(metrics) = &stats.metrics {
        println!(
            "  {} {} train / {} test",
            "Split:".bright_cyan(),
            metrics.train_rows,
            metrics.test_rows
        );
        println!(
            "  {} MAE {:.4}  RMSE {:.4}  R² {:.4}",
            format!("{}:", config.target_column).bright_cyan(),
            metrics.mae,
            metrics.rmse,
            metrics.r_squared
        );
    }

    if let Some(path) = &stats.predictions_path {
        println!("  {} {}", "Predictions:".bright_cyan(), path.display());
    }
    if let Some(path) = &stats.metrics_path {
        println!("  {} {}", "Metrics:".bright_cyan(), path.display());
    }
    for path in &stats.chart_paths {
        println!("  {} {}", "Chart:".bright_cyan(), path.display());
    }
    for failure in &stats.chart_failures {
        println!("  {} {}", "Chart skipped:".yellow(), failure);
    }
    println!(
        "  {} {} ms",
        "Time:".bright_cyan(),
        stats.processing_time_ms
    );
}
