//! `plotline serve` -- HTTP JSON API for the Plotline client.
//!
//! Proxies authenticated CRUD against the collection store and exposes the
//! assistant workflow endpoints as an async HTTP service using `axum` +
//! `tokio`. Supports concurrent request handling.
//!
//! Security features:
//! - Bearer-token authentication via PLOTLINE_API_KEY (uniform 401 on a
//!   missing or invalid credential; /health is exempt)
//! - Per-IP rate limiting (default: 120 req/min, configurable)
//! - CORS headers on all responses (permissive; the client is a browser SPA)
//!
//! Endpoints:
//! - GET    /health                      - Server status (exempt from auth)
//! - POST   /collections/{name}/query    - Paginated/searched list of a collection
//! - GET    /collections/{name}/{id}     - Single row by identifier
//! - POST   /collections/{name}          - Insert a row
//! - PUT    /collections/{name}          - Upsert a row by conflict column
//! - DELETE /collections/{name}/{id}     - Delete a row by identifier
//! - POST   /workflows                   - Create an assistant workflow record
//! - POST   /workflows/{id}/dispatch     - Advance a workflow by one phase
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};

use plotline_storage::{CollectionStore, MemoryStore, Record};
use plotline_workflow::{
    AssistantClient, AssistantPhaseAction, HttpAssistant, NullAssistant, WorkflowDispatcher,
};

use self::handlers::{
    handle_create_workflow, handle_delete_row, handle_dispatch_workflow, handle_get_row,
    handle_health, handle_insert_row, handle_not_found, handle_query, handle_upsert_row,
};
use self::middleware::{auth_middleware, rate_limit_middleware};
use self::state::{AppState, RateLimiter};

/// Maximum request body size: 2 MB.
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Default rate limit: 120 requests per minute per IP.
const DEFAULT_RATE_LIMIT: u64 = 120;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Load fixture collections from a JSON object of `{collection: [rows]}`.
async fn load_seed(
    store: &MemoryStore,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let fixtures: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text)?;
    for (collection, rows) in fixtures {
        let rows: Vec<Record> = serde_json::from_value(rows)
            .map_err(|e| format!("seed collection '{}' is not an array of rows: {}", collection, e))?;
        tracing::info!(collection = %collection, rows = rows.len(), "seeded collection");
        store.load(&collection, rows).await;
    }
    Ok(())
}

/// Start the HTTP server on the given port, optionally pre-loading fixtures.
///
/// When TLS cert/key paths are provided (and the `tls` feature is enabled),
/// the server listens over HTTPS using `axum-server` with rustls. Otherwise
/// it uses plain HTTP.
pub async fn start_server(
    port: u16,
    seed: Option<PathBuf>,
    _tls_cert: Option<PathBuf>,
    _tls_key: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &seed {
        load_seed(&store, path).await?;
    }
    let store: Arc<dyn CollectionStore> = store;

    // Assistant pipeline: remote when a URL is configured, otherwise the
    // acknowledging stand-in so workflows can be driven locally.
    let assistant: Arc<dyn AssistantClient> = match std::env::var("PLOTLINE_ASSISTANT_URL")
        .ok()
        .filter(|u| !u.is_empty())
    {
        Some(url) => {
            tracing::info!(url = %url, "assistant pipeline configured");
            Arc::new(HttpAssistant::new(
                url,
                std::env::var("PLOTLINE_ASSISTANT_KEY").ok(),
            ))
        }
        None => Arc::new(NullAssistant),
    };
    let dispatcher = WorkflowDispatcher::new(
        store.clone(),
        Arc::new(AssistantPhaseAction::new(assistant)),
    );

    // Rate limit: from PLOTLINE_RATE_LIMIT env var, or default
    let rate_limit = std::env::var("PLOTLINE_RATE_LIMIT")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT);

    // API key: from PLOTLINE_API_KEY env var (None = no auth)
    let api_key = std::env::var("PLOTLINE_API_KEY")
        .ok()
        .filter(|k| !k.is_empty());

    if api_key.is_some() {
        tracing::info!("bearer-token authentication enabled");
    }
    tracing::info!(rate_limit, "rate limit per minute per IP");

    let state = Arc::new(AppState {
        store,
        dispatcher,
        rate_limiter: RateLimiter::new(rate_limit),
        api_key,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/collections/{name}/query", post(handle_query))
        .route(
            "/collections/{name}/{id}",
            get(handle_get_row).delete(handle_delete_row),
        )
        .route(
            "/collections/{name}",
            post(handle_insert_row).put(handle_upsert_row),
        )
        .route("/workflows", post(handle_create_workflow))
        .route("/workflows/{id}/dispatch", post(handle_dispatch_workflow))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);

    // TLS support via axum-server + rustls (requires `tls` feature)
    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&_tls_cert, &_tls_key) {
        let config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        tracing::info!("listening on https://0.0.0.0:{}", port);
        axum_server::bind_rustls(socket_addr, config)
            .serve(app.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await?;
        return Ok(());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://0.0.0.0:{}", port);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to install Ctrl+C handler");
    }
}
