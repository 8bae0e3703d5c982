//! Router assembly.

mod entity;
mod status;

pub use entity::{entity_routes, BODY_LIMIT};
pub use status::status_routes;

use crate::state::AppState;
use axum::Router;

/// Health, readiness and version at the root, entity pipelines under `/api/v1`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(status_routes(state.clone()))
        .nest("/api/v1", entity_routes(state))
}
