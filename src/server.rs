//! HTTP surface: routes, body limit and request tracing.

use crate::assemble::Assembler;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::response::Response;
use axum::routing::{any, get};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state.
pub type AppState = Arc<Assembler>;

/// Build the service router.
///
/// `/typst` and `/typst/` route to the same handler as `/typst/{file}` so
/// that a missing file name is a 400 rather than a 404. Every method is
/// accepted at the routing level; the handler answers non-POST with 405.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config().max_upload_bytes;
    Router::new()
        .route("/typst", any(compile_document))
        .route("/typst/", any(compile_document))
        .route("/typst/*path", any(compile_document))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn compile_document(State(assembler): State<AppState>, request: Request) -> Response {
    assembler.handle(request).await
}

async fn health() -> &'static str {
    "ok"
}
