//! Binary entry point: parses [`EngineConfig`], wires up tracing, and serves
//! the engine's router until a shutdown signal arrives.

use std::process::ExitCode;

use clap::Parser;
use ephemeral_service::Engine;
use ephemeral_service::config::EngineConfig;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    let config = EngineConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ephemeral_service=info".into()))
        .init();

    tracing::info!("starting ephemeral-service with config: {config:#?}");

    let shutdown = CancellationToken::new();
    let max_wait_time_shutdown = config.max_wait_time_shutdown;
    let bind_addr = config.bind_addr;

    let engine = Engine::new(config, shutdown.clone());
    let router = engine.router().into_make_service_with_connect_info::<std::net::SocketAddr>();

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr().map(|addr| addr.to_string()).unwrap_or_else(|_| "invalid addr".into()));

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router).with_graceful_shutdown(async move { server_shutdown.cancelled().await }).await;
        if let Err(err) = result {
            tracing::error!("axum server error: {err:?}");
        }
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping...");
    shutdown.cancel();

    match tokio::time::timeout(max_wait_time_shutdown, server).await {
        Ok(_) => tracing::info!("shut down cleanly"),
        Err(_) => tracing::warn!("could not finish shutdown within {:?}", max_wait_time_shutdown),
    }

    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
