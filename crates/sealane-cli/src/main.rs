use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sealane_client::{IngestService, PageSource, ReqwestFetcher};
use sealane_core::project;
use sealane_core::store::{MemoryLedger, MemoryStore};
use sealane_core::traits::{EntityStore, SystemClock};

#[derive(Parser)]
#[command(name = "sealane", version, about = "BC Ferries sailing status tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the departures overview page
    Departures {
        /// Replay a captured payload instead of fetching
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Ingest the current conditions page
    Conditions {
        /// Replay a captured payload instead of fetching
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Ingest the per-sailing detail pages
    Detail {
        /// Replay a captured payload instead of fetching
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Ingest the ferry location map pages
    Locations {
        /// Replay a captured payload instead of fetching
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Run departures, conditions, and locations in sequence
    Update,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sealane=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let store = MemoryStore::new();
    let ledger = MemoryLedger::new();
    let service =
        IngestService::new(ReqwestFetcher::new()?, store.clone(), ledger.clone(), SystemClock);

    match cli.command {
        Commands::Departures { input } => {
            service.ingest_departures(page_source(input)?).await?;
        }
        Commands::Conditions { input } => {
            service.ingest_conditions(page_source(input)?).await?;
        }
        Commands::Detail { input } => {
            service.ingest_sailing_detail(page_source(input)?).await?;
        }
        Commands::Locations { input } => {
            service.ingest_locations(page_source(input)?).await?;
        }
        Commands::Update => {
            service.update_all().await?;
        }
    }

    dump(&store, &ledger).await
}

fn page_source(input: Option<PathBuf>) -> Result<PageSource> {
    match input {
        Some(path) => {
            let payload = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read payload from {}", path.display()))?;
            Ok(PageSource::Payload(payload))
        }
        None => Ok(PageSource::Live),
    }
}

/// Print all entity projections and a run summary as one JSON document.
async fn dump(store: &MemoryStore, ledger: &MemoryLedger) -> Result<()> {
    let mut terminals = Vec::new();
    for terminal in store.all_terminals()? {
        terminals.push(project::terminal_view(store, &terminal).await?);
    }

    let mut routes = Vec::new();
    for route in store.routes().await? {
        routes.push(project::route_view(store, &route).await?);
    }

    let mut ferries = Vec::new();
    for ferry in store.ferries().await? {
        ferries.push(project::ferry_view(store, &ferry).await?);
    }

    let mut sailings = Vec::new();
    for sailing in store.all_sailings()? {
        sailings.push(project::sailing_view(store, &sailing).await?);
    }

    let runs: Vec<_> = ledger
        .runs()?
        .iter()
        .map(|run| {
            serde_json::json!({
                "kind": run.kind.to_string(),
                "started_at": run.started_at,
                "status": run.status,
                "successful": run.successful,
                "captures": run.captures.len(),
            })
        })
        .collect();

    let document = serde_json::json!({
        "terminals": terminals,
        "routes": routes,
        "ferries": ferries,
        "sailings": sailings,
        "runs": runs,
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
