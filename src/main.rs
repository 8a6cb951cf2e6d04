//! CLI entry point for the auto-zero tool.
//!
//! Provides subcommands for replaying recorded tick logs through the
//! decision engine, driving a scripted fleet on a polling schedule, and
//! listing the metrics eligible for zeroing.

mod sim;

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::sim::ScriptedFleet;
use anyhow::Result;
use autozero::engine::{AutoZeroEngine, DEFAULT_RETENTION_HOURS};
use autozero::metrics::AUTO_ZERO_METRICS;
use autozero::output::{append_record, print_json};
use autozero::replay::replay_file;
use autozero::source::TelemetrySource;
use autozero::types::DecisionRecord;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::Instrument;
use tracing::{debug, error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "autozero")]
#[command(about = "A tool to evaluate auto-zero decisions over vehicle telemetry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded tick log through the decision engine
    Replay {
        /// Path to the tick log CSV
        #[arg(value_name = "TICK_LOG")]
        input: String,

        /// CSV file to append per-tick decisions to
        #[arg(short, long, default_value = "decisions.csv")]
        output: String,

        /// Optional CSV file to append the run summary to
        #[arg(long)]
        summary: Option<String>,

        /// Evaluate with the auto-zero feature flag off
        #[arg(long, default_value_t = false)]
        disabled: bool,
    },
    /// Drive a scripted fleet through the engine on a polling schedule
    Simulate {
        /// Number of scripted vehicles
        #[arg(short, long, default_value_t = 3)]
        vehicles: usize,

        /// Sample rate: poll the fleet every X seconds
        #[arg(short = 'r', long, default_value_t = 60)]
        sample_rate: u64,

        /// Number of polling rounds (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 30)]
        num_rounds: usize,

        /// Maximum number of concurrent vehicle polls
        #[arg(short, long, default_value_t = 4)]
        concurrency: usize,

        /// Directory for per-vehicle decision CSVs
        #[arg(short, long, default_value = "decisions")]
        output_dir: String,

        /// Evaluate with the auto-zero feature flag off
        #[arg(long, default_value_t = false)]
        disabled: bool,
    },
    /// List the metrics eligible for auto-zeroing
    ListMetrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/autozero.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("autozero.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            input,
            output,
            summary,
            disabled,
        } => {
            let stats = replay_file(&input, !disabled, Some(&output))?;
            print_json(&stats)?;

            if let Some(summary) = summary {
                append_record(&summary, &stats)?;
            }
        }
        Commands::Simulate {
            vehicles,
            sample_rate,
            num_rounds,
            concurrency,
            output_dir,
            disabled,
        } => {
            simulate(
                vehicles,
                sample_rate,
                num_rounds,
                concurrency,
                &output_dir,
                !disabled,
            )
            .await?;
        }
        Commands::ListMetrics => {
            for (metric_id, label) in AUTO_ZERO_METRICS {
                info!(metric_id, label, "Auto-zero metric");
            }
            info!(total = AUTO_ZERO_METRICS.len(), "Eligible metric table");
        }
    }

    Ok(())
}

/// Polls every scripted vehicle concurrently, evaluating the auto-zero
/// decision for each reported field and appending one decision row per
/// field to per-vehicle date-based CSV files.
#[tracing::instrument(
    skip(output_dir, enabled),
    fields(vehicles, sample_rate, num_rounds, concurrency)
)]
async fn simulate(
    vehicles: usize,
    sample_rate: u64,
    num_rounds: usize,
    concurrency: usize,
    output_dir: &str,
    enabled: bool,
) -> Result<()> {
    let source = Arc::new(ScriptedFleet::new(vehicles, Utc::now()));
    let engine = Arc::new(Mutex::new(AutoZeroEngine::new()));

    let fleet = source.vehicles().await?;
    info!(vehicle_count = fleet.len(), "Scripted fleet ready");

    if num_rounds == 0 {
        info!(sample_rate, "Polling infinitely. Press Ctrl+C to stop.");
    } else {
        info!(num_rounds, sample_rate, "Starting polling rounds");
    }

    // Create output directory if it doesn't exist
    std::fs::create_dir_all(output_dir)?;

    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency));

    let mut round = 0usize;
    let mut last_cleanup = Utc::now();

    loop {
        // Check if we've reached the round limit (0 = infinite)
        if num_rounds > 0 && round >= num_rounds {
            break;
        }
        round += 1;

        // Hourly engine housekeeping, once globally rather than per vehicle.
        let now = Utc::now();
        if now - last_cleanup >= chrono::Duration::hours(1) {
            let roster: HashSet<String> = fleet.iter().cloned().collect();
            let mut engine = engine.lock().unwrap();
            engine.cleanup_old_entries(DEFAULT_RETENTION_HOURS);
            engine.prune_vehicles(&roster);
            last_cleanup = now;
            info!(zeroed = engine.zeroed_count(), "Engine housekeeping complete");
        }

        info!(
            round,
            total = if num_rounds == 0 { None } else { Some(num_rounds) },
            "Starting polling round"
        );

        let mut tasks = vec![];

        for vehicle_id in &fleet {
            let sem = semaphore.clone();
            let source = source.clone();
            let engine = engine.clone();
            let output_dir = output_dir.to_string();
            let vehicle_id = vehicle_id.clone();

            let vehicle_span = tracing::info_span!("poll_vehicle", vehicle_id = %vehicle_id);

            let task = tokio::spawn(
                async move {
                    let _permit = sem.acquire().await.unwrap();

                    let now = Utc::now();
                    let date = now.format("%Y-%m-%d").to_string();
                    let vehicle_dir = format!("{}/vehicle_id={}", output_dir, vehicle_id);

                    // Create directory structure if it doesn't exist
                    if let Err(e) = std::fs::create_dir_all(&vehicle_dir) {
                        error!(dir = %vehicle_dir, error = %e, "Failed to create vehicle directory");
                        return;
                    }

                    let output_file = format!("{}/date={}.csv", vehicle_dir, date);

                    let trip = match source.latest_trip(&vehicle_id).await {
                        Ok(trip) => trip,
                        Err(e) => {
                            error!(error = %e, "Trip poll failed, falling back to staleness-only");
                            None
                        }
                    };

                    match source.poll_fields(&vehicle_id).await {
                        Ok(fields) => {
                            debug!(field_count = fields.len(), "Fields polled, evaluating");
                            for (metric_id, reading) in &fields {
                                let zeroed = {
                                    let mut engine = engine.lock().unwrap();
                                    engine.should_zero_metric(
                                        &vehicle_id,
                                        metric_id,
                                        Some(reading),
                                        trip.as_ref(),
                                        enabled,
                                    )
                                };

                                let reported_value = if zeroed {
                                    reading.zero_value().as_f64()
                                } else {
                                    reading.last_value.as_f64()
                                };
                                let record = DecisionRecord {
                                    ts: now,
                                    vehicle_id: vehicle_id.clone(),
                                    metric_id: metric_id.clone(),
                                    zeroed,
                                    reported_value,
                                };
                                if let Err(e) = append_record(&output_file, &record) {
                                    error!(error = %e, "Failed to write decision record");
                                }
                            }
                        }
                        Err(e) => error!(error = %e, "Field poll failed"),
                    }
                }
                .instrument(vehicle_span),
            );

            tasks.push(task);
        }

        // Wait for all tasks to complete
        for task in tasks {
            let _ = task.await;
        }

        // If not the last round, wait before next iteration
        if num_rounds == 0 || round < num_rounds {
            debug!(sample_rate, "Waiting before next polling round");
            tokio::time::sleep(tokio::time::Duration::from_secs(sample_rate)).await;
        }
    }

    let engine = engine.lock().unwrap();
    info!(
        output_dir,
        zeroed = engine.zeroed_count(),
        "Finished polling rounds"
    );
    Ok(())
}
