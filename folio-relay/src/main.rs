//! Folio relay: WebSocket pub/sub for whiteboard sync.
//!
//! Environment:
//! - `FOLIO_BIND_ADDR` (default `127.0.0.1:9090`)
//! - `FOLIO_BROADCAST_CAPACITY` (default 256)
//! - `RUST_LOG` (default `info`)

use folio_collab::{RelayServer, ServerConfig};
use log::{info, warn};

/// Build the server config from an env-style lookup, keeping defaults for
/// missing or unparsable values.
fn config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ServerConfig {
    let mut config = ServerConfig::default();

    if let Some(addr) = lookup("FOLIO_BIND_ADDR") {
        config.bind_addr = addr;
    }

    if let Some(raw) = lookup("FOLIO_BROADCAST_CAPACITY") {
        match raw.parse::<usize>() {
            Ok(capacity) if capacity > 0 => config.broadcast_capacity = capacity,
            _ => warn!(
                "Ignoring FOLIO_BROADCAST_CAPACITY={raw:?}, using {}",
                config.broadcast_capacity
            ),
        }
    }

    config
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = config_from_lookup(|key| std::env::var(key).ok());
    info!(
        "Starting Folio relay on {} (topic capacity {})",
        config.bind_addr, config.broadcast_capacity
    );

    let server = RelayServer::new(config);
    if let Err(e) = server.run().await {
        log::error!("Relay stopped: {e}");
        std::process::exit(1);
    }
}
