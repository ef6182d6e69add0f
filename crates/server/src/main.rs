//! Streaming decode server entry point

use std::net::SocketAddr;
use std::sync::Arc;

use w2lserve_config::{load_settings, Settings};
use w2lserve_engine::{load_tokens, W2lStream};
use w2lserve_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings(std::env::var("W2LSERVE_ENV").ok().as_deref())?;

    init_tracing(&settings);

    tracing::info!("starting w2lserve v{}", env!("CARGO_PKG_VERSION"));

    // Engine load is fatal on failure: a missing library or model file
    // means there is nothing to serve.
    let engine = Arc::new(W2lStream::load(&settings.engine)?);
    let tokens = load_tokens(&settings.engine.tokens)?;
    tracing::info!(tokens = tokens.len(), "loaded vocabulary");

    let state = AppState::new(settings.clone(), engine, tokens);

    // Idle-session cleanup runs on its own cadence, decoupled from request
    // traffic. The sender is kept so the task stops on shutdown.
    let reaper_shutdown = state.registry.start_reaper();

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = reaper_shutdown.send(true);
    tracing::info!("server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}

/// Initialize tracing from the observability settings
fn init_tracing(settings: &Settings) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!(
            "w2lserve_server={level},w2lserve_engine={level},tower_http=debug"
        )
        .into()
    });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
