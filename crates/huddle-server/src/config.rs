//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use huddle_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_POOL_SIZE, DEFAULT_SUBSCRIBER_QUEUE, DEFAULT_WS_IDLE_TIMEOUT_SECS,
    DEFAULT_WS_PING_INTERVAL_SECS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP and WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8000`
    pub http_addr: SocketAddr,

    /// SQLite database file. Parent directories are created on startup.
    /// Env: `DATABASE_PATH`
    /// Default: `./huddle.db`
    pub database_path: PathBuf,

    /// Idle connections kept by the database pool.
    /// Env: `DB_POOL_SIZE`
    /// Default: `8`
    pub pool_size: usize,

    /// Outbound queue depth per realtime connection. Events beyond it are
    /// dropped for that connection.
    /// Env: `SUBSCRIBER_QUEUE`
    /// Default: `256`
    pub subscriber_queue: usize,

    /// Interval between heartbeat pings sent on each realtime connection.
    /// Env: `WS_PING_INTERVAL_SECS`
    /// Default: `25`
    pub ws_ping_interval: Duration,

    /// A realtime connection that receives nothing (pongs included) for this
    /// long is closed and pruned from its rooms. Must exceed the ping
    /// interval.
    /// Env: `WS_IDLE_TIMEOUT_SECS`
    /// Default: `45`
    pub ws_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./huddle.db"),
            pool_size: DEFAULT_POOL_SIZE,
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
            ws_ping_interval: Duration::from_secs(DEFAULT_WS_PING_INTERVAL_SECS),
            ws_idle_timeout: Duration::from_secs(DEFAULT_WS_IDLE_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.trim().is_empty() {
                config.database_path = PathBuf::from(path);
            }
        }

        if let Some(n) = parse_positive(&lookup, "DB_POOL_SIZE") {
            config.pool_size = n;
        }

        if let Some(n) = parse_positive(&lookup, "SUBSCRIBER_QUEUE") {
            config.subscriber_queue = n;
        }

        if let Some(secs) = parse_positive(&lookup, "WS_PING_INTERVAL_SECS") {
            config.ws_ping_interval = Duration::from_secs(secs as u64);
        }

        if let Some(secs) = parse_positive(&lookup, "WS_IDLE_TIMEOUT_SECS") {
            config.ws_idle_timeout = Duration::from_secs(secs as u64);
        }

        if config.ws_idle_timeout <= config.ws_ping_interval {
            let defaults = Self::default();
            tracing::warn!(
                ping = ?config.ws_ping_interval,
                idle = ?config.ws_idle_timeout,
                "WS_IDLE_TIMEOUT_SECS must exceed WS_PING_INTERVAL_SECS, using defaults"
            );
            config.ws_ping_interval = defaults.ws_ping_interval;
            config.ws_idle_timeout = defaults.ws_idle_timeout;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = lookup(key)?;
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}
