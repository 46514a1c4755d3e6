//! Fitness chat relay
//!
//! Single-binary service that:
//! 1. Accepts `{ "message": ... }` on `POST /api/chat`
//! 2. Wraps it with the fitness coach system prompt
//! 3. Calls the OpenRouter completion API, rotating across a pool of API keys
//!    when a key is rate limited
//! 4. Serves the built frontend in production mode

mod chat;
mod config;
mod error;
mod metrics;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, Method, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use completion::ResilientCaller;
use key_pool::KeyPool;
use metrics_exporter_prometheus::PrometheusHandle;
use provider::constants::CLIENT_TITLE;
use provider::{OpenRouterProvider, OpenRouterSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::chat::ChatState;
use crate::config::{Config, ServerConfig};

/// How long in-flight requests may run after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    chat: ChatState,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// In production mode with a `static_dir`, unmatched paths are served from
/// that directory and fall back to `index.html` for client-side routing.
fn build_router(state: AppState, server: &ServerConfig) -> Result<Router> {
    let origin = HeaderValue::from_str(&server.app_url)
        .with_context(|| format!("app_url is not a valid origin: {}", server.app_url))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let mut router = Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/test", get(api_test_handler))
        .route("/metrics", get(metrics_handler));

    if let (false, Some(dir)) = (server.mode.is_development(), &server.static_dir) {
        info!(dir = %dir.display(), "serving static frontend");
        let spa = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
        router = router.fallback_service(spa);
    }

    Ok(router
        .layer(tower::limit::ConcurrencyLimitLayer::new(server.max_connections))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before anything reads the environment
    let dotenv = dotenvy::dotenv();

    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting fitness-chat-relay");
    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "failed to load .env file"),
    }

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    match &config_path {
        Some(path) => info!(path = %path.display(), "loading configuration"),
        None => info!("no config file, using defaults and environment"),
    }

    let mut config = Config::load(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("failed to load config from {}", path.display()),
        None => "failed to load config from environment".to_string(),
    })?;

    let configured_keys = config.configured_keys();
    metrics::set_configured_keys(configured_keys);
    let pool = Arc::new(KeyPool::new(std::mem::take(&mut config.upstream.api_keys)));
    if pool.is_empty() {
        warn!("no API keys configured; chat requests will fail until keys are provided");
    }

    info!(
        listen_addr = %config.server.listen_addr(),
        mode = ?config.server.mode,
        base_url = %config.upstream.base_url,
        model = %config.upstream.model,
        keys = configured_keys,
        slots = ?pool.slots(),
        max_attempts = ?config.upstream.max_attempts,
        "configuration loaded"
    );

    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let provider = OpenRouterProvider::new(
        client,
        OpenRouterSettings {
            base_url: config.upstream.base_url.clone(),
            model: config.upstream.model.clone(),
            app_url: config.server.app_url.clone(),
            title: CLIENT_TITLE.to_string(),
            timeout: Duration::from_secs(config.upstream.timeout_secs),
        },
    );
    let caller =
        ResilientCaller::new(pool, Arc::new(provider)).with_max_attempts(config.upstream.max_attempts);

    let app_state = AppState {
        chat: ChatState {
            caller: Arc::new(caller),
            mode: config.server.mode,
        },
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, &config.server)?;

    let listen_addr = config.server.listen_addr();
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race it against the
    // timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

async fn chat_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    chat::chat_request(&state.chat, body, request_id).await
}

/// Connectivity probe for the frontend.
async fn api_test_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "message": "Backend connection successful!",
        "availableKeys": state.chat.caller.pool().len(),
    }))
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
