//! Router assembly: operational routes at the root, resources under `/api`.

pub mod common;
pub mod entity;

pub use common::*;
pub use entity::*;

use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Full application router with request tracing and a body size cap.
pub fn app_router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .merge(operational_routes(state.clone()))
        .nest("/api", entity_routes(state))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
}
