use anyhow::{Context, Result};
use clap::Parser;
use pubmed_harvest::config::{find_config_file, load_config};
use pubmed_harvest::harvest::Harvester;
use pubmed_harvest::sources::PubMedSource;
use pubmed_harvest::utils::ProgressReporter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// PubMed Harvest - page through a PubMed search into per-batch JSON files,
/// resuming from the last checkpoint
#[derive(Parser, Debug)]
#[command(name = "pubmed-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Harvest PubMed article metadata into per-batch JSON files", long_about = None)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Discard the checkpoint and start a new search
    #[arg(long)]
    restart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("pubmed_harvest={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration from file if specified or found in default locations
    let config_path = cli.config.clone().or_else(find_config_file);
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }
    let config = load_config(config_path.as_deref()).context("Failed to load configuration")?;

    tracing::info!(
        "Writing batches of {} to {}",
        config.page_size,
        config.output_dir.display()
    );

    let source = Arc::new(PubMedSource::new(&config)?);
    let harvester = Harvester::new(source, &config)
        .with_context(|| format!("Failed to prepare {}", config.output_dir.display()))?
        .with_progress(ProgressReporter::new(cli.quiet));

    if cli.restart && harvester.checkpoints().clear()? {
        tracing::info!(
            "Removed checkpoint {}",
            harvester.checkpoints().path().display()
        );
    }

    let summary = harvester.run().await?;

    if !cli.quiet {
        println!(
            "Harvested {} articles in {} batches ({} of {} results processed)",
            summary.articles, summary.batches_written, summary.next_offset, summary.total_count
        );
    }

    Ok(())
}
