//! Command-line watcher: prints batched change events for a set of paths.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use watchstream::{EventBatch, Observer, StreamConfig};

/// Watch directories and print each batch of change events.
#[derive(Parser)]
#[command(name = "watchstream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Paths to watch
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Report per-file events instead of changed directories
    #[arg(long)]
    file_events: bool,

    /// Batching latency in milliseconds
    #[arg(long, default_value = "10")]
    latency_ms: u64,

    /// Stop after this many seconds instead of running until killed
    #[arg(long)]
    duration_secs: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchstream=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = StreamConfig::new()
        .with_file_events(cli.file_events)
        .with_latency(Duration::from_millis(cli.latency_ms));
    let observer = Observer::spawn(config, print_batch)?;
    for path in &cli.paths {
        observer.schedule(path.clone());
    }
    info!("Watching {} paths", cli.paths.len());

    if let Some(secs) = cli.duration_secs {
        std::thread::sleep(Duration::from_secs(secs));
        observer.stop();
    }
    observer.join()?;
    Ok(())
}

fn print_batch(batch: &EventBatch) -> Result<()> {
    for (path, flags) in batch.iter() {
        println!("{}\t{flags:?}", path.display());
    }
    Ok(())
}
