use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::info;

mod api;
mod backends;
mod config;
mod error;
mod proto;
mod registry;
mod resolve;
mod state;
mod stream;
mod translate;

pub use config::Config;
pub use error::AppError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "oc_router=info".into()),
        )
        .init();

    let config = Config::load().context("failed to load configuration")?;

    info!(
        bind_host = %config.bind_host,
        bind_port = config.bind_port,
        upstream_base_url = %config.upstream_base_url,
        "oc-router starting"
    );

    let state = Arc::new(state::AppState::new(config));

    // The registry must be populated before the server accepts traffic —
    // a failed startup fetch is fatal (§5, §7).
    state
        .registry
        .fetch(&state.registry_http, &state.config.upstream_base_url)
        .await
        .context("failed to fetch model list from upstream at startup")?;

    let addr: SocketAddr = format!("{}:{}", state.config.bind_host, state.config.bind_port)
        .parse()
        .context("invalid bind address")?;

    let app = api::router(Arc::clone(&state)).layer(
        tower_http::trace::TraceLayer::new_for_http()
            .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
            .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
    );

    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
