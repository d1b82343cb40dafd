//! scalarlog CLI: feed JSON-lines metrics into per-category CSV logs.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use scalarlog::{LoggerConfig, MetricValue, MetricsLogger, RunMode};

#[derive(Parser)]
#[command(
    name = "scalarlog",
    about = "Per-category CSV metrics logger",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log JSON lines of the form {"step": N, "metrics": {"loss": 0.5, "val/acc": 0.9}}
    Ingest {
        /// JSON-lines input file (default: stdin)
        input: Option<PathBuf>,
        /// Job name (one directory per job under the base directory)
        #[arg(long, short)]
        job: Option<String>,
        /// Root directory for job directories (default: current directory)
        #[arg(long)]
        base_dir: Option<PathBuf>,
        /// What to do with existing logs: append | fresh-start
        #[arg(long, short)]
        mode: Option<RunMode>,
        /// YAML logger config; the flags above override its fields
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

/// One input line.
#[derive(Debug, Deserialize)]
struct Observation {
    step: u64,
    metrics: HashMap<String, MetricValue>,
}

fn main() -> Result<()> {
    // Diagnostics go to stderr so stdout only carries the summary
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            input,
            job,
            base_dir,
            mode,
            config,
        } => {
            let config = build_config(config, job, base_dir, mode)?;
            cmd_ingest(config, input)?;
        }
    }

    Ok(())
}

fn build_config(
    config_path: Option<PathBuf>,
    job: Option<String>,
    base_dir: Option<PathBuf>,
    mode: Option<RunMode>,
) -> Result<LoggerConfig> {
    let mut config = match config_path {
        Some(path) => LoggerConfig::from_yaml_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let job = job
                .clone()
                .context("--job is required when no --config is given")?;
            LoggerConfig::in_current_dir(job)
        }
    };
    if let Some(job) = job {
        config.job_name = job;
    }
    if let Some(dir) = base_dir {
        config.base_dir = dir;
    }
    if let Some(mode) = mode {
        config.mode = mode;
    }
    Ok(config)
}

// ─── Command implementations ──────────────────────────────────────────────────

fn cmd_ingest(config: LoggerConfig, input: Option<PathBuf>) -> Result<()> {
    let reader: Box<dyn BufRead> = match &input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let job_dir = config.job_dir();
    let mut logger = MetricsLogger::new(config)?;
    let mut observations = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("Failed to read line {}", line_no))?;
        if line.trim().is_empty() {
            continue;
        }
        let obs: Observation = serde_json::from_str(&line)
            .with_context(|| format!("Invalid observation on line {}", line_no))?;
        debug!(step = obs.step, metrics = obs.metrics.len(), "Ingesting observation");
        logger
            .log(&obs.metrics, obs.step)
            .with_context(|| format!("Failed to log line {}", line_no))?;
        observations += 1;
    }

    logger.close()?;

    let categories: Vec<&str> = logger.categories().collect();
    println!(
        "Logged {} observation(s) to {} [{}]",
        observations,
        job_dir.display(),
        categories.join(", ")
    );
    Ok(())
}
