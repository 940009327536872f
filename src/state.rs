//! Shared application state for all routes.

use crate::config::ResolvedModel;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Resolved once at startup; the catalog is fixed for the process lifetime.
    pub model: Arc<ResolvedModel>,
}
