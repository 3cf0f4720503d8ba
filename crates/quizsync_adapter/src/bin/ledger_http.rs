#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use quizsync_adapter::{ledger_router, AdapterConfig, LedgerHttpState};
use quizsync_os::wall_clock_now;
use quizsync_storage::ledger_store::LedgerStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AdapterConfig::from_env();
    let addr: SocketAddr = config.bind.parse()?;
    let state = LedgerHttpState::new(
        Arc::new(Mutex::new(LedgerStore::new_in_memory())),
        Arc::new(wall_clock_now),
    );
    let app = ledger_router(state);

    info!(%addr, "quizsync_ledger_http listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
