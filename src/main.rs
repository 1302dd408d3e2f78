use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use netdrift::config::Config;
use netdrift::measurement::Measurement;
use netdrift::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "netdrift")]
#[command(author, version, about = "Streaming network-telemetry anomaly detection")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay JSON-lines measurements through the detection pipeline
    ///
    /// Finalized event groups are printed to stdout in line protocol.
    Replay {
        /// Measurement file, one JSON object per line
        input: PathBuf,
    },

    /// Validate a configuration file
    CheckConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Commands::Replay { input } => replay(config, &input),
        Commands::CheckConfig => {
            config.validate()?;
            println!("configuration ok");
            Ok(())
        }
    }
}

fn replay(config: Config, input: &PathBuf) -> Result<()> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open measurement file: {}", input.display()))?;
    let reader = BufReader::new(file);

    let mut pipeline = Pipeline::new(config);
    let mut line_no = 0u64;

    for line in reader.lines() {
        let line = line?;
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let measurement: Measurement = match serde_json::from_str(&line) {
            Ok(m) => m,
            Err(e) => {
                warn!(line = line_no, "skipping unparseable measurement: {}", e);
                continue;
            }
        };

        for group in pipeline.process(&measurement)? {
            print_group(&group);
        }
    }

    // the source is exhausted; close whatever is still open
    for group in pipeline.flush() {
        print_group(&group);
    }

    let stats = pipeline.stats();
    info!(
        measurements = stats.measurements_seen,
        dropped_lossy = stats.dropped_lossy,
        dropped_missing_value = stats.dropped_missing_value,
        dropped_late = stats.dropped_late,
        events = stats.events_emitted,
        groups = stats.groups_emitted,
        "replay finished"
    );
    Ok(())
}

fn print_group(group: &netdrift::event::EventGroup) {
    debug!(
        stream = %group.stream_id,
        events = group.events.len(),
        "emitting event group"
    );
    for event in &group.events {
        println!("{}", event.to_line_protocol());
    }
}
