//! Read-only HTTP surface over the published artifacts.
//!
//! Serves whatever the cycle writer last published; handlers never touch
//! pipeline state. The preview is cacheable for one poll interval, the
//! metadata and health endpoints are not cacheable at all.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

const PREVIEW_CACHE_CONTROL: &str = "public, max-age=15";
const NO_STORE: &str = "no-store";

#[derive(Clone)]
pub struct HttpState {
    pub preview_path: PathBuf,
    pub metadata_path: PathBuf,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/preview", get(preview))
        .route("/metadata", get(metadata))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: HttpState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http surface listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn preview(State(state): State<HttpState>) -> Response {
    serve_json_file(&state.preview_path, PREVIEW_CACHE_CONTROL).await
}

async fn metadata(State(state): State<HttpState>) -> Response {
    serve_json_file(&state.metadata_path, NO_STORE).await
}

async fn health() -> Response {
    (
        [(header::CACHE_CONTROL, NO_STORE)],
        Json(serde_json::json!({"status": "ok"})),
    )
        .into_response()
}

async fn serve_json_file(path: &Path, cache_control: &'static str) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CACHE_CONTROL, cache_control),
            ],
            bytes,
        )
            .into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CACHE_CONTROL, NO_STORE),
            ],
            r#"{"error": "Preview not available"}"#,
        )
            .into_response(),
    }
}
