//! Steplog CLI
//!
//! Thin wrapper around steplog-core for writing records from scripts and
//! locating log files.
//!
//! ## Usage
//!
//! ```bash
//! # Write one record and print the file it went to
//! steplog write --severity warning "quota at 95%"
//!
//! # Run concurrent scopes with repeated errors
//! steplog demo --scopes 4 --records 10 --errors 3
//!
//! # Print today's Error file
//! steplog path --severity error
//!
//! # Use a JSON config, overriding its base directory
//! steplog --config steplog.json --base-dir /srv/app write "deployed"
//! ```

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use steplog_core::{
    commit_error, commit_info, log_file_path, LogConfig, LogService, ScopeOptions, Severity,
    StepLogger,
};
use tracing::info;

/// Steplog - scoped elapsed-time logging
#[derive(Parser)]
#[command(name = "steplog")]
#[command(version = "0.1.0")]
#[command(about = "Steplog - scoped elapsed-time logging")]
#[command(
    long_about = "Writes per-severity, per-day log files with step and total elapsed times, collapsing repeated errors into summaries."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Base directory; logs go to <base-dir>/Temp/Logs
    #[arg(short, long, global = true)]
    base_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a single record through a scope
    Write {
        /// Severity of the record
        #[arg(short, long, default_value = "information")]
        severity: Severity,

        /// Banner written before the record
        #[arg(short, long)]
        title: Option<String>,

        /// Message text
        message: String,
    },

    /// Run concurrent scopes and report what was written
    Demo {
        /// Number of concurrent scopes
        #[arg(long, default_value_t = 4)]
        scopes: usize,

        /// Information records per scope
        #[arg(long, default_value_t = 10)]
        records: usize,

        /// Identical errors per scope
        #[arg(long, default_value_t = 3)]
        errors: usize,

        /// Echo every commit to stdout
        #[arg(long)]
        echo: bool,
    },

    /// Print the log file path for a severity and day
    Path {
        /// Severity directory
        #[arg(short, long, default_value = "information")]
        severity: Severity,

        /// Day as YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Build the configuration from `--config` and `--base-dir`.
fn load_config(config: Option<PathBuf>, base_dir: Option<PathBuf>) -> Result<LogConfig> {
    let mut config = match config {
        Some(path) => LogConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => LogConfig::default(),
    };
    if let Some(base_dir) = base_dir {
        config.base_dir = base_dir;
    }
    config.validate()?;
    Ok(config)
}

fn write_record(
    config: LogConfig,
    severity: Severity,
    title: Option<String>,
    message: String,
) -> Result<PathBuf> {
    let service = LogService::start(config)?;
    let logs_dir = service.config().logs_dir();

    let mut options = ScopeOptions::from_config(service.config());
    if let Some(title) = title {
        options = options.with_title(title);
    }

    let scope = service.scope(options)?;
    if severity == Severity::Error {
        commit_error!(scope, "{}", message)?;
    } else {
        scope.commit_with(severity, message, None)?;
    }
    // The file is named after the record's date, not the date at shutdown
    let date = scope
        .last_timestamp()
        .map(|timestamp| timestamp.date_naive())
        .unwrap_or_else(|| Local::now().date_naive());
    scope.flush()?;
    drop(scope);

    service.shutdown()?;
    Ok(log_file_path(&logs_dir, severity, date))
}

fn run_demo(config: LogConfig, scopes: usize, records: usize, errors: usize, echo: bool) -> Result<()> {
    let service = LogService::start(config)?;
    let started = Instant::now();

    std::thread::scope(|s| -> Result<()> {
        let workers: Vec<_> = (0..scopes)
            .map(|n| {
                let service = &service;
                s.spawn(move || -> Result<()> {
                    let options = ScopeOptions::from_config(service.config())
                        .with_title(format!("demo scope {}", n))
                        .with_console(echo);
                    let scope = service.scope(options)?;
                    for k in 0..records {
                        commit_info!(scope, "scope {} step {}", n, k)?;
                    }
                    for _ in 0..errors {
                        commit_error!(scope, "simulated failure")?;
                    }
                    scope.flush()?;
                    Ok(())
                })
            })
            .collect();

        for worker in workers {
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("demo scope thread panicked"))??;
        }
        Ok(())
    })?;

    let logs_dir = service.config().logs_dir();
    service.shutdown()?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "Demo finished");

    let today = Local::now().date_naive();
    println!("Scopes: {}", scopes);
    println!("Records committed: {}", scopes * (records + errors));
    println!("Logs directory: {}", logs_dir.display());
    for severity in [Severity::None, Severity::Information, Severity::Error] {
        println!("  {}", log_file_path(&logs_dir, severity, today).display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config, cli.base_dir)?;

    match cli.command {
        Commands::Write {
            severity,
            title,
            message,
        } => {
            let path = write_record(config, severity, title, message)?;
            println!("{}", path.display());
        }

        Commands::Demo {
            scopes,
            records,
            errors,
            echo,
        } => {
            run_demo(config, scopes, records, errors, echo)?;
        }

        Commands::Path { severity, date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            println!("{}", log_file_path(&config.logs_dir(), severity, date).display());
        }
    }

    Ok(())
}
