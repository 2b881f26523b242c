use anyhow::{Context, Result};
use inscription_indexer::broadcast::Broadcaster;
use inscription_indexer::config::Config;
use inscription_indexer::repository::Database;
use inscription_indexer::rpc::{ChainSource, RpcClient};
use inscription_indexer::scanner::SyncEngine;
use inscription_indexer::server::{AppState, router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting inscription indexer");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Contract address: {:?}", config.contract_address);
    info!("RPC URLs: {} endpoint(s) configured", config.rpc_urls.len());

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let client = RpcClient::new(&config.rpc_urls, config.contract_address)?;
    match client.chain_id().await {
        Ok(chain_id) if chain_id == config.chain_id => info!("Connected to chain {}", chain_id),
        Ok(chain_id) => warn!(
            "RPC reports chain {} but CHAIN_ID is {}",
            chain_id, config.chain_id
        ),
        Err(e) => warn!("Could not read chain id: {:#}", e),
    }
    let source: Arc<dyn ChainSource> = Arc::new(client);

    let broadcaster = Broadcaster::for_window(config.sync.recent_window);
    let engine = SyncEngine::new(
        source.clone(),
        db.clone(),
        broadcaster.clone(),
        config.contract_address,
        config.start_block,
        config.sync.clone(),
    )?;
    let state = AppState::new(db, broadcaster, source, engine.stats());
    let sync_task = tokio::spawn(engine.run());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    sync_task.abort();
    Ok(())
}
