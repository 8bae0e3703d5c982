//! Shared application state for all routes.

use crate::config::ResolvedModel;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    /// Resolved once at startup.
    pub model: Arc<ResolvedModel>,
}

impl AppState {
    pub fn new(pool: SqlitePool, model: ResolvedModel) -> Self {
        AppState {
            pool,
            model: Arc::new(model),
        }
    }
}
