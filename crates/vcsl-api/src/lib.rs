//! # vcsl-api — HTTP Binding for the Status Engine
//!
//! ## API Surface
//!
//! | Route                                            | Module                     |
//! |--------------------------------------------------|----------------------------|
//! | `POST /v1/credentials/issue`                     | [`routes::credentials`]    |
//! | `POST /v1/credentials/status`                    | [`routes::credentials`]    |
//! | `GET /v1/status-lists/{allocator}/{purpose}/{list}` | [`routes::status_lists`] |
//! | `GET /health/liveness`                           | unauthenticated            |
//! | `GET /metrics`                                   | unauthenticated            |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the application router.
///
/// Health and metrics are mounted outside the auth middleware so health checks
/// and scrapers need no credentials.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::credentials::router())
        .merge(routes::status_lists::router())
        .layer(from_fn_with_state(
            Arc::clone(&state.authorizer),
            auth::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let ops = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/metrics", get(render_metrics))
        .with_state(state);

    Router::new().merge(ops).merge(api)
}

async fn liveness() -> &'static str {
    "ok"
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
