//! # huddle-server
//!
//! Chat backend for Huddle.
//!
//! This binary provides:
//! - **REST API** (axum) for users, chats, messages and group tasks
//! - **Realtime WebSocket** channel that fans newly persisted messages out to
//!   every connection that joined the chat's room
//! - **Group lifecycle** handling: finishing a group's last open task clears
//!   its task set and posts a system note to the group

mod api;
mod broadcast;
mod config;
mod error;
mod ledger;
mod lifecycle;
mod messaging;
mod rooms;
mod socket;
mod storage;
mod timeline;

#[cfg(test)]
mod testing;

use tracing::info;
use tracing_subscriber::EnvFilter;

use huddle_shared::constants::APP_NAME;
use huddle_store::DatabasePool;

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
                .unwrap_or_else(|_| EnvFilter::new("info,huddle_server=debug")),
        )
        .init();

    info!("Starting {} server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the database pool (runs migrations on the first connection)
    // -----------------------------------------------------------------------
    let pool = DatabasePool::open(&config.database_path, config.pool_size)?;
    let app_state = AppState::new(pool, &config);

    // -----------------------------------------------------------------------
    // 4. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
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
