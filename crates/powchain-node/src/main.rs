use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use clap::Parser;
use powchain_core::{ChainStore, Engine, InMemoryStore};
use powchain_node::{
    api::{self, AppState},
    config::Args,
};
use powchain_storage::SledStore;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match &args.data_dir {
        Some(dir) => serve(&args, Arc::new(SledStore::open(dir)?)).await,
        None => {
            info!("no --data-dir given; ledger lives in memory");
            serve(&args, Arc::new(InMemoryStore::new())).await
        }
    }
}

async fn serve<S: ChainStore + 'static>(args: &Args, store: Arc<S>) -> Result<()> {
    let engine = Arc::new(Engine::open(
        store,
        args.difficulty_controller()?,
        args.miner(),
        args.engine_config(),
    )?);
    let view = engine.chain()?;
    info!(
        length = view.length,
        difficulty = view.difficulty,
        "ledger ready"
    );

    let app = api::router(AppState {
        engine: Arc::clone(&engine),
        mine_timeout: args.mine_timeout(),
    });

    let addr: SocketAddr = args.listen.parse()?;
    info!("powchain-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.close()?;
    info!("ledger closed");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed.
        std::future::pending::<()>().await;
    }
}
