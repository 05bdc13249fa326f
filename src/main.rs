mod decoding;
mod historical;
mod output;
mod reconcile;
mod rpc;
#[cfg(test)]
mod testing;
mod types;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use output::{CsvRowSink, SalesDatabase};
use reconcile::{ExportSettings, RunReport};
use rpc::{FlowAccessClient, LedgerClient};
use types::config::{ExporterConfig, MissingRowPolicy};

const DEFAULT_CONFIG_PATH: &str = "config/config.json";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Export marketplace sales from the Flow ledger",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Path to the configuration file. Defaults to config/config.json when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    export: ExportArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan recent blocks for sales and write them to CSV (default)
    Export(ExportArgs),
    /// Load an exported CSV into a SQLite database
    Import(ImportArgs),
}

#[derive(Args)]
struct ExportArgs {
    /// Number of blocks to scan back from the sealed head
    #[arg(long)]
    window_size: Option<u64>,
    /// Fully qualified purchase event type
    #[arg(long)]
    event_type: Option<String>,
    /// CSV file to write
    #[arg(long)]
    output: Option<PathBuf>,
    /// Access node REST endpoint
    #[arg(long)]
    endpoint: Option<String>,
    /// What to do with sales whose listing cannot be recovered
    #[arg(long, value_enum)]
    missing_rows: Option<MissingRowPolicy>,
    /// Listing queries kept in flight at once
    #[arg(long)]
    concurrency: Option<usize>,
}

impl ExportArgs {
    fn apply(self, config: &mut ExporterConfig) {
        if let Some(window_size) = self.window_size {
            config.window_size = window_size;
        }
        if let Some(event_type) = self.event_type {
            config.event_type = event_type;
        }
        if let Some(output) = self.output {
            config.output_path = output;
        }
        if let Some(endpoint) = self.endpoint {
            config.endpoint = Some(endpoint);
        }
        if let Some(missing_rows) = self.missing_rows {
            config.missing_rows = missing_rows;
        }
        if let Some(concurrency) = self.concurrency {
            config.query_concurrency = concurrency;
        }
    }
}

#[derive(Args)]
struct ImportArgs {
    /// Exported sales CSV
    #[arg(long, default_value = "result.csv")]
    input: PathBuf,
    /// SQLite database file, created if missing
    #[arg(long, default_value = "sales.sqlite3")]
    database: PathBuf,
    /// Print the player on the first imported sale from this set
    #[arg(long)]
    set_id: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Cli {
        config,
        export: default_export,
        command,
    } = Cli::parse();

    match command {
        Some(Commands::Export(args)) => export(config, args).await,
        Some(Commands::Import(args)) => import(args),
        None => export(config, default_export).await,
    }
}

async fn export(config_path: Option<PathBuf>, args: ExportArgs) -> anyhow::Result<()> {
    let mut config =
        ExporterConfig::load_or_default(config_path.as_deref(), Path::new(DEFAULT_CONFIG_PATH))?;
    args.apply(&mut config);
    config.validate()?;

    let endpoint = config.resolve_endpoint();
    let client = FlowAccessClient::new(config.rpc_client_config(&endpoint)?)
        .with_context(|| format!("Failed to build client for {}", endpoint))?;
    client
        .ping()
        .await
        .with_context(|| format!("Access node {} is not reachable", endpoint))?;
    tracing::info!("Connected to access node {}", endpoint);

    let mut sink = CsvRowSink::create(&config.output_path, config.placeholder.clone());

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current sale");
            watcher.cancel();
        }
    });

    let settings = ExportSettings::from_config(&config);
    let report = reconcile::run(&client, &settings, &mut sink, &cancel).await?;
    log_report(&report, &config.output_path);

    Ok(())
}

fn log_report(report: &RunReport, output: &Path) {
    let unlisted = report
        .failures
        .iter()
        .filter(|f| f.error.is_not_found())
        .count();
    tracing::info!(
        "Wrote {} of {} sales from blocks {} to {} ({} placeholders, {} unresolved, {} no longer listed)",
        report.written,
        report.scanned,
        report.range,
        output.display(),
        report.placeholders,
        report.failures.len(),
        unlisted
    );
    for failure in &report.failures {
        tracing::debug!(
            "Unresolved sale: moment {} sold by {} at height {} (tx {})",
            failure.asset_id,
            failure.seller,
            failure.block_height,
            failure.transaction_id
        );
    }
}

fn import(args: ImportArgs) -> anyhow::Result<()> {
    let mut db = SalesDatabase::open(&args.database)
        .with_context(|| format!("Failed to open {}", args.database.display()))?;
    let summary = db
        .import_file(&args.input)
        .with_context(|| format!("Failed to import {}", args.input.display()))?;
    tracing::info!(
        "Imported {} sales into {} ({} skipped)",
        summary.imported,
        args.database.display(),
        summary.skipped
    );

    if let Some(set_id) = args.set_id {
        match db.player_name_for_set(set_id)? {
            Some(name) => println!("{}", name),
            None => tracing::warn!("No imported sales from set {}", set_id),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_exports() {
        let cli = Cli::try_parse_from(["sales-export", "--window-size", "25"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.export.window_size, Some(25));
    }

    #[test]
    fn test_export_flags_override_config() {
        let cli = Cli::try_parse_from([
            "sales-export",
            "export",
            "--missing-rows",
            "placeholder",
            "--concurrency",
            "4",
            "--output",
            "out.csv",
        ])
        .unwrap();
        let Some(Commands::Export(args)) = cli.command else {
            panic!("expected export subcommand");
        };

        let mut config = ExporterConfig::default();
        args.apply(&mut config);
        assert_eq!(config.missing_rows, MissingRowPolicy::Placeholder);
        assert_eq!(config.query_concurrency, 4);
        assert_eq!(config.output_path, PathBuf::from("out.csv"));
        assert_eq!(config.window_size, 10);
    }

    #[test]
    fn test_import_defaults() {
        let cli = Cli::try_parse_from(["sales-export", "import", "--set-id", "26"]).unwrap();
        let Some(Commands::Import(args)) = cli.command else {
            panic!("expected import subcommand");
        };
        assert_eq!(args.input, PathBuf::from("result.csv"));
        assert_eq!(args.database, PathBuf::from("sales.sqlite3"));
        assert_eq!(args.set_id, Some(26));
    }
}
