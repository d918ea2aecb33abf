//! IOC Ingest CLI
//!
//! Polls threat-intel sources for indicators and hands them to operators.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ingest_core::Extractor;
use ingest_runtime::Config;
use ingest_sources::ReqwestTransport;

#[derive(Parser)]
#[command(name = "ioc-ingest")]
#[command(author, version, about = "IOC Ingest: indicator extraction from threat-intel sources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured sources and dispatch to operators
    Run {
        /// Pipeline config file
        #[arg(short, long, env = "IOC_INGEST_CONFIG")]
        config: PathBuf,

        /// Poll once and exit
        #[arg(long)]
        once: bool,
    },

    /// Extract artifacts from a local file and print them as JSON
    Extract {
        /// File to read
        #[arg(short, long)]
        file: PathBuf,

        /// Reference link recorded on every artifact
        #[arg(short, long)]
        link: String,

        /// Source name recorded on every artifact
        #[arg(short, long, default_value = "cli")]
        source: String,

        /// Keep URLs that are not defanged
        #[arg(long)]
        all: bool,
    },

    /// Validate a config file
    Check {
        /// Pipeline config file
        #[arg(short, long, env = "IOC_INGEST_CONFIG")]
        config: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact();

    // RUST_LOG wins over -v
    if std::env::var_os("RUST_LOG").is_some() {
        builder.with_env_filter(EnvFilter::from_default_env()).init();
    } else {
        builder.with_max_level(log_level).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run { config, once } => run(&config, once).await?,
        Commands::Extract {
            file,
            link,
            source,
            all,
        } => extract(&file, &link, &source, all)?,
        Commands::Check { config } => check(&config)?,
    }

    Ok(())
}

async fn run(path: &Path, once: bool) -> Result<()> {
    let config = Config::load(path).with_context(|| format!("loading {}", path.display()))?;
    let transport = ReqwestTransport::shared(&config.http)?;
    let mut pipeline = config.build_pipeline(&transport).await?;

    if once {
        let report = pipeline.run_once().await;
        info!(
            "Polled {} sources ({} failed): {} artifacts, {} handled, {} filtered, {} failed",
            report.sources_polled,
            report.sources_failed,
            report.artifacts,
            report.dispatch.handled,
            report.dispatch.filtered,
            report.dispatch.failed
        );
    } else {
        pipeline.run(None).await;
    }

    Ok(())
}

fn extract(file: &Path, link: &str, source: &str, include_nonobfuscated: bool) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let content = String::from_utf8_lossy(&bytes);

    let artifacts = Extractor::new(source).process_element(&content, link, include_nonobfuscated);
    info!("Extracted {} artifacts from {}", artifacts.len(), file.display());
    println!("{}", serde_json::to_string_pretty(&artifacts)?);
    Ok(())
}

fn check(path: &Path) -> Result<()> {
    let config = Config::load(path).with_context(|| format!("loading {}", path.display()))?;
    println!(
        "{}: {} sources, {} operators, polling every {}s",
        path.display(),
        config.sources.len(),
        config.operators.len(),
        config.general.interval_secs
    );
    for source in &config.sources {
        println!("  source   {}", source.name());
    }
    for operator in &config.operators {
        println!("  operator {}", operator.name());
    }
    Ok(())
}
