use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use beacon_retrieval::config::{CURRENT_VERSION, settings_file_path};
use beacon_retrieval::{RetrieveConfig, Settings};

/// Beacon retrieval - inspect and upgrade retrieval configuration
#[derive(Parser)]
#[command(name = "beacon-retrieval", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a settings file and print the effective retrieval config
    Check {
        /// Settings file (defaults to ~/.config/omni/beacon/retrieval.toml)
        #[arg(env = "BEACON_RETRIEVAL_SETTINGS")]
        path: Option<PathBuf>,
    },
    /// Read a stored retrieval config of any version and print it at the current version
    Upgrade {
        /// JSON file holding the stored config
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,beacon_retrieval=info",
        1 => "info,beacon_retrieval=debug",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Check { path } => check(path.as_deref()),
        Command::Upgrade { path } => upgrade(&path),
    }
}

fn check(path: Option<&Path>) -> anyhow::Result<()> {
    let settings = match path {
        Some(path) => Settings::load(path)?,
        None => {
            if let Some(default) = settings_file_path() {
                tracing::debug!(path = %default.display(), "using default settings path");
            }
            Settings::load_default()?
        }
    };

    tracing::info!(
        search_method = %settings.retrieval.search_method(),
        graph_endpoint = settings.graph.api_endpoint().is_some(),
        rerank_endpoint = settings.reranking.api_endpoint().is_some(),
        "settings are valid"
    );
    tracing::debug!(engine = ?settings.engine, "engine settings");

    println!("{}", serde_json::to_string_pretty(&settings.retrieval.to_value())?);
    Ok(())
}

fn upgrade(path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)?;
    let stored: serde_json::Value = serde_json::from_str(&raw)?;
    let from = stored
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(u64::from(CURRENT_VERSION));

    let config = RetrieveConfig::from_value(&stored)?;
    tracing::info!(from, to = config.version(), "upgraded retrieval config");

    println!("{}", serde_json::to_string_pretty(&config.to_value())?);
    Ok(())
}
