//! The `talemon` binary: `scheduler`, `worker`, `extractor` as long-running
//! processes, plus `migrate` and `add-url` for ops/local use (§6). Each
//! long-running subcommand installs logging, loads `Config`, opens a
//! `PgPool`, and runs its service until `SIGINT`/`SIGTERM` via a
//! `CancellationToken`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use talemon_browser::{BrowserDriver, FakeBrowserDriver};
use talemon_core::Config;
use talemon_extractor::{ExtractorLoop, PassthroughExtractor};
use talemon_objectstore::ObjectStore;
use talemon_scheduler::Scheduler;
use talemon_store::{Page, SeedOrigin, SeedSource};
use talemon_worker::Worker;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "talemon")]
#[command(about = "Traceable web-data collection pipeline")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file. Falls back to compiled-in defaults plus
    /// environment overrides when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the zombie reclamation loop.
    Scheduler,
    /// Claim and process due pages.
    Worker,
    /// Poll for unextracted snapshots and derive structured records.
    Extractor,
    /// Apply embedded SQL migrations.
    Migrate,
    /// Seed a monitored page (the external "seed loader" entry point).
    AddUrl {
        url: String,
        /// Re-check interval in seconds.
        #[arg(long, default_value_t = 3600)]
        check_interval_secs: i64,
        #[arg(long)]
        note: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    talemon_core::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env_and_file(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Scheduler => run_scheduler(config).await,
        Commands::Worker => run_worker(config).await,
        Commands::Extractor => run_extractor(config).await,
        Commands::Migrate => run_migrate(config).await,
        Commands::AddUrl {
            url,
            check_interval_secs,
            note,
        } => run_add_url(config, url, check_interval_secs, note).await,
    }
}

async fn open_pool(config: &Config) -> Result<sqlx::PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the state store")
}

async fn run_scheduler(config: Config) -> Result<()> {
    let pool = open_pool(&config).await?;
    let scheduler = Scheduler::new(pool, config.scheduler, config.rate_limit);
    scheduler.run_reclaimer(shutdown_signal()).await
}

async fn run_worker(config: Config) -> Result<()> {
    let pool = open_pool(&config).await?;
    let objectstore =
        ObjectStore::from_config(&config.oss).context("failed to open object store")?;

    // No concrete Chromium-DevTools-Protocol client is implemented here —
    // the browser driver is an external collaborator per the pipeline's
    // Non-goals (§1, §6). `FakeBrowserDriver` with no queued responses will
    // fail every capture at the HTTP gate; swap this for a real
    // `BrowserDriver` impl to drive production traffic.
    let browser: Arc<dyn BrowserDriver> = Arc::new(FakeBrowserDriver::new());

    let scheduler = Scheduler::new(pool.clone(), config.scheduler.clone(), config.rate_limit.clone());
    let worker = Arc::new(Worker::new(
        pool,
        objectstore,
        browser,
        scheduler,
        config.worker,
        config.hasher,
    ));
    worker.run(shutdown_signal()).await
}

async fn run_extractor(config: Config) -> Result<()> {
    let pool = open_pool(&config).await?;
    let objectstore =
        ObjectStore::from_config(&config.oss).context("failed to open object store")?;
    let extractor = PassthroughExtractor::new(config.extractor.version.clone());
    let loop_ = ExtractorLoop::new(pool, objectstore, extractor, config.extractor);
    loop_.run(shutdown_signal()).await
}

async fn run_migrate(config: Config) -> Result<()> {
    let pool = open_pool(&config).await?;
    talemon_store::migrate(&pool).await?;
    tracing::info!("migrations applied");
    Ok(())
}

async fn run_add_url(
    config: Config,
    url: String,
    check_interval_secs: i64,
    note: Option<String>,
) -> Result<()> {
    let pool = open_pool(&config).await?;
    let page = Page::seed(&url, check_interval_secs, &pool).await?;
    SeedSource::record(page.id, SeedOrigin::Manual, note.as_deref(), &pool).await?;
    tracing::info!(page_id = page.id, url = %page.url, "seeded page");
    Ok(())
}

/// A token cancelled on `SIGINT` or `SIGTERM`, mirroring the ambient
/// stack's graceful-shutdown pattern for long-running services.
fn shutdown_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let signalled = token.clone();
    tokio::spawn(async move {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        #[cfg(unix)]
        let terminate = async {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            sigterm.recv().await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }

        tracing::info!("shutdown signal received");
        signalled.cancel();
    });
    token
}
