//! Entity handlers: create, find, update, delete. The entity is resolved from its plural path segment.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::response::{success_counted, success_created, success_ok};
use crate::service::CrudService;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::Value;

fn entity<'a>(state: &'a AppState, plural: &str) -> Result<&'a ResolvedEntity, AppError> {
    state
        .model
        .entity_by_plural(plural)
        .ok_or_else(|| AppError::NotFound(plural.to_string()))
}

/// Empty body means "no argument"; anything else has to be JSON.
fn parse_body(body: &Bytes) -> Result<Option<Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("body must be JSON: {}", e)))
}

pub async fn create(
    State(state): State<AppState>,
    Path(plural): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &plural)?;
    let options = parse_body(&body)?;
    let created = CrudService::create(&state.pool, &state.model, entity, options.as_ref()).await?;
    Ok(success_created(created))
}

pub async fn find(
    State(state): State<AppState>,
    Path(plural): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &plural)?;
    let criteria = parse_body(&body)?;
    let found = CrudService::find(&state.pool, &state.model, entity, criteria.as_ref()).await?;
    Ok(success_ok(found))
}

/// Body `{update, criteria}`; either may be missing and is reported by the pipeline.
pub async fn update(
    State(state): State<AppState>,
    Path(plural): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &plural)?;
    let body = parse_body(&body)?;
    let (update, criteria) = match &body {
        Some(Value::Object(m)) => (m.get("update"), m.get("criteria")),
        Some(_) => return Err(AppError::Shape("body has to be an object of {update, criteria}".into())),
        None => (None, None),
    };
    let ids = CrudService::update(&state.pool, &state.model, entity, update, criteria).await?;
    Ok(success_counted(ids))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(plural): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &plural)?;
    let criteria = parse_body(&body)?;
    let deleted = CrudService::delete(&state.pool, &state.model, entity, criteria.as_ref()).await?;
    Ok(success_ok(deleted))
}
