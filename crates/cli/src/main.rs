use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestrator::Runtime;
use serde_json::Value;
use switchboard_core::config;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONNECTORS_FILE: &str = "connectors.toml";
const DEFAULT_CREDENTIALS_FILE: &str = "credentials.toml";

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Run workflow steps against connector services", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Connector address table
    #[arg(long, global = true, default_value = DEFAULT_CONNECTORS_FILE)]
    connectors: PathBuf,

    /// Credentials, keyed by connector namespace
    #[arg(long, global = true, default_value = DEFAULT_CREDENTIALS_FILE)]
    credentials: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a single action and print its response
    Run {
        address: String,

        /// Parameters as a JSON object
        params: Option<String>,
    },
}

/// How a dispatched call ended.
enum Outcome {
    Responded,
    Failed,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match &cli.command {
        Commands::Run { address, params } => run(&cli, address, params.as_deref()).await,
    }
}

async fn run(cli: &Cli, address: &str, params: Option<&str>) -> Result<()> {
    let raw = params.unwrap_or("{}");
    let params: Value = match serde_json::from_str(raw) {
        Ok(params) => params,
        Err(e) => {
            tracing::error!(error = %e, "'{}' can't be parsed as JSON", raw);
            return Ok(());
        }
    };

    let connectors = config::load_connectors(&cli.connectors)
        .await
        .with_context(|| format!("Failed to load connectors from {}", cli.connectors.display()))?;
    let credentials = config::load_credentials(&cli.credentials)
        .await
        .with_context(|| {
            format!(
                "Failed to load credentials from {}",
                cli.credentials.display()
            )
        })?;
    tracing::debug!(connectors = connectors.len(), "Configuration loaded");

    let runtime = Runtime::builder(Handle::current(), connectors, credentials).build();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let responded = done_tx.clone();
    runtime
        .run(address, &params, move |_, response| {
            print_response(&response);
            let _ = responded.send(Outcome::Responded);
        })
        .on_fail(move |_, _| {
            let _ = done_tx.send(Outcome::Failed);
        });

    tokio::select! {
        outcome = done_rx.recv() => {
            if let Some(Outcome::Failed) = outcome {
                tracing::debug!(address = %address, "Call failed");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            }
        }
    }

    runtime.shutdown();
    tracing::info!("Good bye!");
    Ok(())
}

fn print_response(response: &Value) {
    let pretty = serde_json::to_string_pretty(response).unwrap_or_else(|_| response.to_string());
    for line in pretty.lines() {
        tracing::info!("{}", line);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=info,orchestrator=info,connector=info".into()),
        )
        .init();
}
