//! NekoProxy relay.
//!
//! Long-running TCP relay for the fixed service routes. This service:
//! - Accepts connections on each route's public port
//! - Enforces the file-backed IP blocklist, refreshed on a fixed interval
//! - Relays bytes between client and backend in both directions
//! - Appends one record per terminated connection to the connection log

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nekoproxy::{BlocklistStore, Config, ConnectionLogger, Listener};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to NEKO_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting nekoproxy");
    info!(
        backend_host = %config.backend_host,
        listen_ip = %config.listen_ip,
        blocklist_file = %config.blocklist_file.display(),
        connection_log = %config.connection_log.display(),
        reload_interval = ?config.blocklist_reload_interval,
        dial_timeout = ?config.dial_timeout,
        "Configuration loaded"
    );

    let blocklist = Arc::new(BlocklistStore::open(&config.blocklist_file).await);
    let logger = Arc::new(ConnectionLogger::open(&config.connection_log).await?);

    // Periodic refresh starts ticking after the initial load above.
    tokio::spawn(Arc::clone(&blocklist).run_reload_loop(config.blocklist_reload_interval));

    let mut listener_handles = Vec::new();
    for route in config.routes() {
        let name = route.name.clone();
        match Listener::bind(
            route,
            config.listen_ip,
            Arc::clone(&blocklist),
            Arc::clone(&logger),
            config.dial_timeout,
        ) {
            Ok(listener) => {
                listener_handles.push(tokio::spawn(Arc::new(listener).run()));
            }
            Err(e) => {
                // Fatal to this route only; the remaining routes keep serving.
                error!(service = %name, error = %e, "Failed to bind listener");
            }
        }
    }

    if listener_handles.is_empty() {
        anyhow::bail!("No listeners could be bound");
    }

    for handle in listener_handles {
        let _ = handle.await;
    }

    Ok(())
}
