//! # homestead-server
//!
//! HTTP API for buyer/owner inquiries on property listings.
//!
//! This binary provides:
//! - **Thread resolution**: one conversation per buyer, listing and owner,
//!   reused on every follow-up inquiry
//! - **Messaging** between buyer and owner (and a mediating admin), with
//!   hosted attachment URLs
//! - **Unread counters and read markers** per side, polled by the web UI
//! - **Role-scoped inbox listings** ordered by recent activity

mod api;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use homestead_store::StoreHandle;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,homestead_server=debug")),
        )
        .init();

    info!("Starting Homestead inquiry server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the store (creates the file and applies migrations)
    // -----------------------------------------------------------------------
    let db_path = config.database_path.clone();
    let store = tokio::task::spawn_blocking(move || StoreHandle::init(db_path)).await??;
    info!(path = %store.path().display(), "Inquiry store ready");

    let http_addr = config.http_addr;
    let app_state = AppState {
        store,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
