use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use inventory_ingest::clock::SystemClock;
use inventory_ingest::config::ConfigLoader;
use inventory_ingest::dedupe::RecentPayloads;
use inventory_ingest::fetch::HttpObjectStore;
use inventory_ingest::logging::setup_logging;
use inventory_ingest::store::{InstanceStore, MemoryInstanceStore, PgInstanceStore, StoreBackend};
use inventory_ingest::{Channel, Pipeline, ReconciliationEngine, WorkerPool};
use tokio::io::BufReader;
use tokio::runtime::Handle;
use tracing::info;

#[derive(Parser)]
#[clap(
    name = "inventory-ingest",
    about = "Ingests runtime telemetry snapshots into the runtimes inventory",
    version
)]
struct Cli {
    /// TOML config file; environment variables prefixed with INVENTORY_ override it
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply the database migrations
    Migrate,

    /// Read newline-delimited envelopes from stdin and process them
    Run {
        #[clap(long, value_enum, default_value_t = Channel::Announce)]
        channel: Channel,

        /// Keep everything in memory instead of writing to the database
        #[clap(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load_config(cli.config.as_deref())?;
    setup_logging(&config.log_level, config.log_dir.as_deref().map(Path::new))?;

    match cli.command {
        Command::Migrate => {
            let store = PgInstanceStore::connect(&config).await?;
            store.migrate().await?;
            store.close().await;
        }
        Command::Run { channel, dry_run } => {
            let store = if dry_run {
                StoreBackend::Memory(MemoryInstanceStore::new())
            } else {
                StoreBackend::Postgres(PgInstanceStore::connect(&config).await?)
            };

            let pipeline = Pipeline::new(
                &config,
                Arc::new(HttpObjectStore::new(reqwest::Client::new(), Handle::current())),
                Arc::new(RecentPayloads::from_config(&config)),
                Arc::new(SystemClock),
                ReconciliationEngine::new(store, config.serialize_by_linking_hash),
                Handle::current(),
            );
            let pool = WorkerPool::new(Arc::new(pipeline), config.max_workers);

            info!(
                ?channel,
                dry_run,
                max_workers = config.max_workers,
                "reading envelopes from stdin"
            );
            let stats = pool
                .run(channel, BufReader::new(tokio::io::stdin()))
                .await?;
            let counts = pool
                .pipeline()
                .engine()
                .store()
                .counts()
                .await
                .context("failed to read store counts")?;

            let summary = serde_json::json!({ "stats": stats, "store": counts });
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to render summary")?
            );
        }
    }

    Ok(())
}
