use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use svctopo::api::EntityClient;
use svctopo::export::{write_csv, write_graphml};
use svctopo::{
    CancellationToken, Config, DiscoveryMode, DiscoveryReport, LogObserver, RunOutcome,
    TopologyEngine,
};

#[derive(Parser, Debug)]
#[command(name = "svctopo", version)]
#[command(about = "Discover service-to-service topology and export it as an edge list")]
struct Cli {
    /// Path to config.toml (default: SVCTOPO_CONFIG env var or ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// BFS discovery of the downstream topology from one or more root services
    Discover {
        /// Root service ids (comma-separated or repeated)
        #[arg(long, required = true, value_delimiter = ',')]
        roots: Vec<String>,

        /// Output file path; the extension is adjusted per format
        #[arg(long)]
        output: PathBuf,

        /// Export formats (repeatable)
        #[arg(long, value_enum, default_values_t = [ExportFormat::Csv])]
        format: Vec<ExportFormat>,
    },
    /// Flat full scan of every service with both relationship directions
    Scan {
        /// Output file path; the extension is adjusted per format
        #[arg(long)]
        output: PathBuf,

        /// Export formats (repeatable)
        #[arg(long, value_enum, default_values_t = [ExportFormat::Csv])]
        format: Vec<ExportFormat>,
    },
    /// Probe the API connection and report the total service count
    Check,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Csv,
    Graphml,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", default_level),
    )
    .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    log::info!("Base URL: {}", config.base_url());

    let client = EntityClient::new(&config)?;

    // Ctrl-C sets the cooperative flag; the run notices at its next poll
    // point and winds down with partial results.
    let cancel = CancellationToken::new();
    let ctrlc_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, cancelling (partial results will be kept)");
            ctrlc_token.cancel();
        }
    });

    match cli.command {
        Command::Check => {
            let total = client.test_connection(&cancel).await?;
            log::info!("Connection successful. Total SERVICE entities available: {}", total);
            println!("{}", total);
            Ok(())
        }
        Command::Discover {
            roots,
            output,
            format,
        } => {
            log::info!("Starting BFS discovery from {} root id(s)", roots.len());
            run_and_export(&client, &config, DiscoveryMode::RootBfs { roots }, &output, &format, &cancel)
                .await
        }
        Command::Scan { output, format } => {
            log::info!("Starting full service scan (page size {})", config.discovery.page_size);
            run_and_export(&client, &config, DiscoveryMode::FullScan, &output, &format, &cancel)
                .await
        }
    }
}

async fn run_and_export(
    client: &EntityClient,
    config: &Config,
    mode: DiscoveryMode,
    output: &PathBuf,
    formats: &[ExportFormat],
    cancel: &CancellationToken,
) -> Result<()> {
    let observer = LogObserver;
    let engine =
        TopologyEngine::new(client, config.discovery.batch_size).with_observer(&observer);

    let report = engine.run(mode, cancel).await;

    match report.outcome {
        RunOutcome::Failed => {
            anyhow::bail!("Discovery failed: {}", report.message);
        }
        RunOutcome::Cancelled => {
            log::warn!(
                "Discovery cancelled; exporting {} partial edge(s)",
                report.edges.len()
            );
        }
        RunOutcome::Completed => {}
    }

    if report.edges.is_empty() {
        log::warn!("No edges found; output files will contain the header only");
    }

    let written = export_all(&report, output, formats)?;

    log::info!("==========================================");
    log::info!("DISCOVERY {}", if report.outcome == RunOutcome::Cancelled { "CANCELLED (partial export)" } else { "COMPLETE" });
    log::info!("  Services discovered: {}", report.services_discovered);
    log::info!("  Edges exported:      {}", report.edges.len());
    log::info!("  Max depth:           {}", report.max_depth);
    for file in &written {
        log::info!("  Output file:         {}", file.display());
    }
    log::info!("==========================================");

    Ok(())
}

fn export_all(
    report: &DiscoveryReport,
    output: &PathBuf,
    formats: &[ExportFormat],
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for format in formats {
        let mut path = output.clone();
        match format {
            ExportFormat::Csv => {
                path.set_extension("csv");
                write_csv(&report.edges, &path)?;
            }
            ExportFormat::Graphml => {
                path.set_extension("graphml");
                write_graphml(&report.edges, &path)?;
            }
        }
        written.push(path);
    }
    Ok(written)
}
