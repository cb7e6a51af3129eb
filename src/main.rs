//! CLI entry point for pumpwatch.
//!
//! `run` starts the scheduler with every configured job; the other
//! subcommands run one pipeline once and print its report as JSON.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use pumpwatch::{
    app::App,
    config::Config,
    jobs::publish_dashboard,
    output::{append_history, print_json},
    scheduler::JobScheduler,
    views::radar_history,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "pumpwatch")]
#[command(about = "Rain and water-level monitoring for a flood-pump network", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every configured job on its schedule and run until Ctrl+C
    Run {
        /// Trigger each job once at startup instead of waiting for its first firing
        #[arg(long, default_value_t = false)]
        warm: bool,
    },
    /// Fetch both sensor feeds once and fuse them onto the roster
    SyncSensors,
    /// Capture one radar frame and evaluate every pump
    Monitor {
        /// Only store samples that raise an alert
        #[arg(long, default_value_t = false)]
        alerts_only: bool,
    },
    /// Pull hourly forecasts for every pump once
    SyncForecast,
    /// Verify forecasts whose target time falls in the last N hours
    Verify {
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
    /// Compute accuracy metrics for one pump
    Metrics {
        /// Pump name as it appears in the roster
        #[arg(value_name = "PUMP")]
        pump: String,

        /// Period length ending now, in hours
        #[arg(long, default_value_t = 24)]
        hours: u32,

        /// Print stored history instead of computing a new entry
        #[arg(long, default_value_t = false)]
        history: bool,
    },
    /// Append one pump's radar samples for a day to a CSV file
    ExportHistory {
        #[arg(value_name = "PUMP")]
        pump: String,

        /// Local calendar day (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// CSV file to append rows to
        #[arg(short, long, default_value = "history.csv")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/pumpwatch.log".to_string());
    let log_dir = Path::new(&log_file_path).parent().unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("pumpwatch.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter("RUST_LOG", "info"));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(env_filter("RUST_LOG_JSON", "debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;
    let app = App::from_config(config).await?;

    match cli.command {
        Commands::Run { warm } => run_scheduler(&app, warm).await?,
        Commands::SyncSensors => {
            let job = app.sensor_job()?;
            let report = job.engine.run_cycle(job.rainfall.as_ref(), job.water_level.as_ref()).await;
            if let Some(p) = &app.publisher {
                publish_dashboard(p.as_ref(), app.store.as_ref()).await?;
            }
            print_json(&report)?;
        }
        Commands::Monitor { alerts_only } => {
            let job = app.monitor_job()?;
            let mut options = job.options;
            options.save_all = !alerts_only;
            let summary = job.engine.run(job.provider.as_ref(), &options).await?;
            if let Some(p) = &app.publisher {
                publish_dashboard(p.as_ref(), app.store.as_ref()).await?;
            }
            print_json(&summary)?;
        }
        Commands::SyncForecast => {
            let job = app.forecast_job();
            let report = job.collector.run(job.provider.clone()).await?;
            print_json(&report)?;
        }
        Commands::Verify { hours } => {
            let end = Utc::now();
            let start = end - chrono::Duration::hours(hours.into());
            let report = app.accuracy_engine().verify(start, end).await?;
            print_json(&report)?;
        }
        Commands::Metrics { pump, hours, history } => {
            if app.roster.get(&pump).is_none() {
                warn!(pump = %pump, "Pump is not in the roster");
            }
            let engine = app.accuracy_engine();
            if history {
                print_json(&engine.metrics_history(&pump, None).await?)?;
            } else {
                let end = Utc::now();
                let start = end - chrono::Duration::hours(hours.into());
                match engine.calculate_metrics(&pump, start, end).await? {
                    Some(metrics) => print_json(&metrics)?,
                    None => info!(pump = %pump, hours, "No verified forecasts in period"),
                }
            }
        }
        Commands::ExportHistory { pump, date, output } => {
            let tz = app.config.feed_timezone;
            let day = date.unwrap_or_else(|| Utc::now().with_timezone(&tz).date_naive());
            let samples = radar_history(app.store.as_ref(), &pump, day, tz).await?;
            let rows = append_history(&output, &samples)?;
            info!(pump = %pump, day = %day, rows, output = %output.display(), "History exported");
        }
    }

    Ok(())
}

fn env_filter(var: &str, default: &str) -> EnvFilter {
    EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new(default))
}

/// Registers and starts every configured job, then waits for Ctrl+C.
#[tracing::instrument(skip(app))]
async fn run_scheduler(app: &App, warm: bool) -> Result<()> {
    let scheduler = JobScheduler::new(app.config.job_timeout);
    let names = app.register_jobs(&scheduler)?;

    for name in &names {
        scheduler.start(name)?;
    }
    info!(jobs = ?names, "Scheduler running. Press Ctrl+C to stop.");

    if warm {
        for name in &names {
            match scheduler.trigger(name).await {
                Ok(run) if run.is_success() => {}
                Ok(run) => warn!(job = %name, error = ?run.error, "Warm-up run failed"),
                Err(e) => warn!(job = %name, error = %e, "Warm-up run skipped"),
            }
        }
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(3600));
    ticker.tick().await;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                for status in scheduler.get_all() {
                    info!(
                        job = %status.name,
                        status = ?status.status,
                        runs = status.run_count,
                        errors = status.error_count,
                        "Job status"
                    );
                }
            }
        }
    }

    scheduler.stop_all();
    info!("Scheduler stopped; waiting for in-flight runs");
    for _ in 0..60 {
        if scheduler.get_all().iter().all(|s| !s.in_flight) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Ok(())
}
