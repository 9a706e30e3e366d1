use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

mod api;
mod app;
mod config;
mod error;
mod feed;
mod models;
mod services;
mod store;

#[cfg(test)]
mod test_support;

use app::AppState;
use config::Config;
use error::{AppError, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info and above unless RUST_LOG says otherwise)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .map(|i| {
            args.get(i + 1)
                .map(PathBuf::from)
                .ok_or_else(|| AppError::Config("--config needs a path".to_string()))
        })
        .transpose()?;
    let headless_refresh = args.iter().any(|arg| arg == "--refresh");

    // Load configuration
    let config = Config::load(config_path.as_deref())?;

    let state = Arc::new(AppState::new(config).await?);

    // If headless refresh, just refresh and exit
    if headless_refresh {
        match state.mirror.refresh().await {
            Ok(count) => println!("Refreshed {} articles", count),
            Err(AppError::UpstreamEmpty) => println!("Upstream returned no articles, cache kept"),
            Err(e) => return Err(e),
        }
        return Ok(());
    }

    let timer = feed::spawn_refresh_timer(
        Arc::clone(&state.mirror),
        state.config.refresh_interval(),
    );

    let listener = TcpListener::bind(&state.config.bind_address).await?;
    tracing::info!(address = %state.config.bind_address, "Server listening");

    let router = api::create_router(Arc::clone(&state));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    timer.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
