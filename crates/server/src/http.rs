//! HTTP endpoints
//!
//! JSON over HTTP. Every endpoint answers `200 OK`; `/decode` reports
//! validation failures through an `{"error": code}` body rather than the
//! status line, which is the contract streaming clients rely on.

use axum::{
    extract::{Json, State},
    response::Html,
    routing::{get, post},
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::decode::DecodeRequest;
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/tokens", get(tokens))
        .route("/stats", get(stats))
        .route("/decode", post(decode))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Landing page with a freshly generated stream id
async fn index() -> Html<String> {
    let stream_id = Uuid::new_v4();
    Html(format!(
        "<!doctype html>\n<html>\n<head><title>w2lserve</title></head>\n<body>\n\
         <h1>w2lserve</h1>\n\
         <p>Streaming decode endpoint: <code>POST /decode</code></p>\n\
         <p>Suggested stream id: <code>{stream_id}</code></p>\n\
         </body>\n</html>\n"
    ))
}

/// Vocabulary list loaded at startup
async fn tokens(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "tokens": *state.tokens }))
}

/// Best-effort process load metrics
async fn stats() -> Json<serde_json::Value> {
    let load = sysinfo::System::load_average();
    Json(serde_json::json!({
        "loadavg": [load.one, load.five, load.fifteen],
    }))
}

/// Run one decode request
async fn decode(
    State(state): State<AppState>,
    Json(request): Json<DecodeRequest>,
) -> Json<serde_json::Value> {
    let body = match state.decoder.decode(request).await {
        Ok(response) => serde_json::json!(response),
        Err(error) => serde_json::json!({ "error": error.to_string() }),
    };
    Json(body)
}
