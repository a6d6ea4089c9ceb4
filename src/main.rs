//! Threadloom controller entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use threadloom::adapters::memory::InMemoryResourceStore;
use threadloom::adapters::sqlite::{initialize_database, PoolConfig, SqliteResourceStore};
use threadloom::application::{register_controllers, Dispatcher};
use threadloom::domain::models::{Config, StoreBackend};
use threadloom::domain::ports::{NullInvoker, ResourceStore};
use threadloom::domain::Client;
use threadloom::infrastructure::config::ConfigLoader;
use threadloom::infrastructure::logging::{LogConfig, LoggerImpl};

#[derive(Parser, Debug)]
#[command(name = "threadloom", version, about = "Run the thread, run and workflow controllers")]
struct Cli {
    /// Configuration file; defaults to .threadloom/config.yaml and .threadloom/local.yaml
    #[arg(short, long, env = "THREADLOOM_CONFIG")]
    config: Option<PathBuf>,
}

async fn open_store(config: &Config) -> Result<Arc<dyn ResourceStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryResourceStore::new())),
        StoreBackend::Sqlite => {
            let pool = initialize_database(
                &format!("sqlite:{}", config.store.path),
                PoolConfig {
                    max_connections: config.store.max_connections,
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("Failed to open store at {}", config.store.path))?;
            Ok(Arc::new(SqliteResourceStore::new(pool)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::try_from(&config.logging)?)?;

    let store = open_store(&config).await?;
    let mut dispatcher = Dispatcher::new(Client::new(store), config.dispatcher.clone());
    register_controllers(&mut dispatcher, Arc::new(NullInvoker::new()), &config.retention);

    let dispatcher = Arc::new(dispatcher);
    dispatcher.start().await.context("Failed to start dispatcher")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");
    dispatcher.stop().await;
    Ok(())
}
