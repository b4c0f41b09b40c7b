//! Signup relay.
//!
//! Receives identity-provider lifecycle events over HTTP and publishes a
//! user-created message to Kafka for every self-registration.

mod config;
mod logging;
mod routes;
mod service;

use std::net::SocketAddr;

use tokio::signal;
use tracing::info;

use crate::config::Config;
use crate::logging::init_logging;
use crate::service::RelayService;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config.rust_log);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting signup relay");

    let service = match RelayService::init(&config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to initialize relay: {e}");
            std::process::exit(1);
        }
    };
    service.post_init().await;

    let addr: SocketAddr = match config.bind_addr().parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(addr = %config.bind_addr(), "Invalid bind address: {e}");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "Failed to bind: {e}");
            std::process::exit(1);
        }
    };
    info!(%addr, "Listening");

    let app = routes::router(service.clone(), config.event_token.clone());
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {e}");
    }

    service.close().await;
    info!("Signup relay stopped");
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
