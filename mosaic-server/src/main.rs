//! Mosaic server binary — the authoritative board plus its WebSocket sync
//! loop, configured from `MOSAIC_*` environment variables.
//!
//! ```text
//! MOSAIC_BIND=0.0.0.0:9090 MOSAIC_WIDTH=200 MOSAIC_HEIGHT=200 \
//!   MOSAIC_TICK_MS=150 RUST_LOG=info mosaic-server
//! ```

use std::str::FromStr;

use log::info;

use mosaic_collab::server::{ServerConfig, SyncServer};

/// Read an env var, falling back to the default on absence or parse failure.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("ignoring unparseable {key}={raw}");
                default
            }
        },
        Err(_) => default,
    }
}

fn config_from_env() -> ServerConfig {
    let defaults = ServerConfig::default();
    ServerConfig {
        bind_addr: env_or("MOSAIC_BIND", defaults.bind_addr),
        width: env_or("MOSAIC_WIDTH", defaults.width),
        height: env_or("MOSAIC_HEIGHT", defaults.height),
        tick_interval_ms: env_or("MOSAIC_TICK_MS", defaults.tick_interval_ms),
        max_observers: env_or("MOSAIC_MAX_OBSERVERS", defaults.max_observers),
        broadcast_capacity: env_or("MOSAIC_BROADCAST_CAPACITY", defaults.broadcast_capacity),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = config_from_env();
    info!(
        "starting mosaic server on {} ({}x{} board, {}ms ticks, max {} observers)",
        config.bind_addr,
        config.width,
        config.height,
        config.tick_interval_ms,
        config.max_observers
    );

    let server = SyncServer::new(config);
    if let Err(e) = server.run().await {
        log::error!("server exited: {e}");
        std::process::exit(1);
    }
}
