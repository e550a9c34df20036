//! maitred: a menu-driven TCP command server
//!
//! Presents a fixed command menu over plain newline-delimited text. Each
//! accepted connection is served by an independent session worker with a
//! paired heartbeat task; a shared handle shuts everything down explicitly.
//!
//! Features:
//! - Fixed command table over sanitized single-line input
//! - Per-connection 3-second liveness heartbeat
//! - Connection cap with accept-side backpressure
//! - Configuration via CLI arguments or TOML file

mod config;
mod connection;
mod identity;
mod protocol;
mod server;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        max_connections = config.max_connections,
        server_name = %config.identity.name,
        "Starting maitred server"
    );

    let server = Server::bind(&config)?;
    let handle = server.handle();

    // Ctrl-C closes every session, then the listener
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_handle.shutdown().await;
        }
    });

    server.serve().await?;

    // Idempotent: waits for any sessions still draining
    handle.shutdown().await;
    info!("Server stopped");
    Ok(())
}
