use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use herald_core::config::HeraldConfig;
use herald_publish::PublisherRegistry;
use herald_scheduler::{
    PublishDispatcher, Scheduler, SqliteDirectory, SqlitePostStore, TickOutcome,
};

#[derive(Parser)]
#[command(name = "herald-daemon")]
#[command(about = "Publishes scheduled social media posts when they come due")]
struct Cli {
    /// Config file (default: $HERALD_CONFIG, then ~/.herald/herald.toml)
    #[arg(long)]
    config: Option<String>,

    /// Run a single scheduling pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "herald_daemon=info,herald_scheduler=info,herald_publish=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > HERALD_CONFIG env > ~/.herald/herald.toml
    let config_path = cli.config.or_else(|| std::env::var("HERALD_CONFIG").ok());
    let config = HeraldConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        HeraldConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    herald_scheduler::db::init_db(&db)?;
    info!("database migrations complete");

    // each store gets its own connection
    let store = Arc::new(SqlitePostStore::new(db)?);
    let directory = Arc::new(SqliteDirectory::new(rusqlite::Connection::open(db_path)?)?);

    let cancel = CancellationToken::new();
    let registry = PublisherRegistry::from_config(&config, cancel.clone())?;
    info!(platforms = ?registry.platforms(), "publishers ready");

    let dispatcher = Arc::new(
        PublishDispatcher::new(Arc::new(registry), directory.clone(), directory.clone())
            .with_target_timeout(config.scheduler.target_timeout()),
    );
    let scheduler = Arc::new(
        Scheduler::new(store, directory, dispatcher, &config.scheduler).with_cancellation(cancel),
    );

    if cli.once {
        scheduler.report_in_flight().await;
        match scheduler.tick().await? {
            TickOutcome::Processed(report) => info!(?report, "single pass finished"),
            other => info!(outcome = ?other, "single pass finished"),
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let runner = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    runner.await?;
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
