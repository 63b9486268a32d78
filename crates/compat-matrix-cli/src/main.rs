//! Compatibility Matrix CLI
//!
//! The `compat-matrix` command turns proxy telemetry snapshots and test
//! evidence into a client/server compatibility matrix.
//!
//! ## Commands
//!
//! - `report`: Run a batch over a results directory and write the reports
//! - `scrape`: Capture one live telemetry snapshot for a combination
//! - `api-keys`: Print the operation catalog

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, Level};

use compat_matrix_core::catalog::reference_table;
use compat_matrix_core::{
    init_tracing, run_batch, scrape_to_file, write_all, CombinationKey, CompatibilityReport,
    HttpSnapshotSource, MatrixConfig, MatrixError,
};

/// Exit code when a batch found nothing usable.
const EXIT_NO_USABLE_INPUT: u8 = 2;
/// Exit code when a scrape returned no data.
const EXIT_NO_DATA: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "compat-matrix")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Proxy client/server compatibility matrix", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "COMPAT_MATRIX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the matrix from a results directory and write all report files
    Report {
        /// Directory holding snapshots, status blocks and test results
        results_dir: PathBuf,

        /// Where to write the reports (default: the results directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Expected client version (repeatable; overrides the config file)
        #[arg(long = "client")]
        clients: Vec<String>,

        /// Expected server version (repeatable; overrides the config file)
        #[arg(long = "server")]
        servers: Vec<String>,

        /// Operation whose imbalance is tolerated (repeatable; replaces the default set)
        #[arg(long = "acceptable")]
        acceptable: Vec<String>,
    },

    /// Capture one telemetry snapshot from a live proxy
    Scrape {
        /// Client version under test
        #[arg(long)]
        client: String,

        /// Server version under test
        #[arg(long)]
        server: String,

        /// Metrics endpoint (default from config)
        #[arg(long)]
        url: Option<String>,

        /// Request timeout in seconds (default from config)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Directory to write the snapshot into
        #[arg(short, long)]
        output_dir: PathBuf,
    },

    /// Print the operation catalog
    ApiKeys {
        /// Print as JSON
        #[arg(long = "as-json")]
        as_json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let code = match cli.command {
        Commands::Report {
            results_dir,
            output_dir,
            clients,
            servers,
            acceptable,
        } => {
            let config = build_config(cli.config.as_deref(), clients, servers, acceptable)?;
            cmd_report(&config, &results_dir, output_dir.as_deref()).await?
        }
        Commands::Scrape {
            client,
            server,
            url,
            timeout_secs,
            output_dir,
        } => {
            let mut config = build_config(cli.config.as_deref(), vec![], vec![], vec![])?;
            if let Some(url) = url {
                config.scrape_url = url;
            }
            if let Some(secs) = timeout_secs {
                config.scrape_timeout_secs = secs;
            }
            cmd_scrape(&config, CombinationKey::new(client, server), &output_dir).await?
        }
        Commands::ApiKeys { as_json } => cmd_api_keys(as_json)?,
    };

    Ok(ExitCode::from(code))
}

/// Load the config file (if any) and apply command-line overrides.
fn build_config(
    path: Option<&Path>,
    clients: Vec<String>,
    servers: Vec<String>,
    acceptable: Vec<String>,
) -> Result<MatrixConfig> {
    let mut config = match path {
        Some(path) => MatrixConfig::load(path)
            .with_context(|| format!("Failed to load config: {:?}", path))?,
        None => MatrixConfig::default(),
    };
    if !clients.is_empty() {
        config.client_versions = clients;
    }
    if !servers.is_empty() {
        config.server_versions = servers;
    }
    if !acceptable.is_empty() {
        config = config.with_acceptable_failures(acceptable);
    }
    Ok(config)
}

async fn cmd_report(
    config: &MatrixConfig,
    results_dir: &Path,
    output_dir: Option<&Path>,
) -> Result<u8> {
    info!("Building compatibility matrix from {:?}", results_dir);

    let outcome = match run_batch(config, results_dir).await {
        Ok(outcome) => outcome,
        Err(MatrixError::NoUsableInput { root }) => {
            eprintln!("No usable input under {:?}: no snapshots or evidence found", root);
            return Ok(EXIT_NO_USABLE_INPUT);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Batch failed for {:?}", results_dir));
        }
    };

    let report = CompatibilityReport::from_outcome(&outcome).context("Failed to build report")?;
    let out = output_dir.unwrap_or(results_dir);
    let paths = write_all(out, &report)?;

    let summary = &report.summary;
    println!(
        "Tested {} of {} combinations ({} missing)",
        summary.tested_combinations, summary.expected_combinations, summary.missing_combinations
    );
    println!(
        "  compatible: {}  acceptable: {}  incompatible: {}  indeterminate: {}  setup failed: {}",
        summary.compatible,
        summary.compatible_with_acceptable_failure,
        summary.incompatible,
        summary.indeterminate,
        summary.setup_failed
    );
    match summary.compatibility_percentage {
        Some(pct) => println!("  compatibility: {:.1}%", pct),
        None => println!("  compatibility: n/a (no combination carried traffic)"),
    }
    if !report.skipped.is_empty() {
        println!("  skipped inputs: {}", report.skipped.len());
    }
    println!("Digest: {}", report.matrix_digest);
    println!("Reports:");
    for path in [
        &paths.json,
        &paths.csv,
        &paths.summary,
        &paths.api_key_reference,
    ] {
        println!("  {}", path.display());
    }

    Ok(0)
}

async fn cmd_scrape(config: &MatrixConfig, key: CombinationKey, output_dir: &Path) -> Result<u8> {
    let source = HttpSnapshotSource::new(
        config.scrape_url.clone(),
        Duration::from_secs(config.scrape_timeout_secs),
    )
    .context("Failed to build HTTP client")?;

    info!("Scraping {} for {}", source.url(), key);
    match scrape_to_file(&source, &key, output_dir, config).await? {
        Some(path) => {
            println!("Snapshot written: {}", path.display());
            Ok(0)
        }
        None => {
            eprintln!("No data from {}", source.url());
            Ok(EXIT_NO_DATA)
        }
    }
}

fn cmd_api_keys(as_json: bool) -> Result<u8> {
    let table = reference_table();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&table)?);
    } else {
        println!("{:>7}  operation", "api_key");
        for entry in &table {
            println!("{:>7}  {}", entry.api_key, entry.name);
        }
    }
    Ok(0)
}
