//! Entity routes. Paths are parameterized by plural; handlers resolve the entity from the model.

use crate::handlers::entity::{create, delete, find, update};
use crate::state::AppState;
use axum::{routing::post, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Largest accepted request body.
pub const BODY_LIMIT: usize = 1024 * 1024;

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:plural", post(create).patch(update))
        .route("/:plural/find", post(find))
        .route("/:plural/delete", post(delete))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .with_state(state)
}
