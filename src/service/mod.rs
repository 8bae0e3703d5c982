//! CrudService: the generic create/find/update/delete pipelines shared by every entity.
//!
//! Each pipeline runs the same steps: `validate` (shape and field checks, no I/O), `build_query`,
//! `execute` and `build_return_object`. Writes run inside one transaction per call.

mod common;
pub mod create;
pub mod delete;
pub mod find;
pub mod update;
mod validation;

pub use find::FindResult;
pub use validation::RequestValidator;

use crate::config::{ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

pub struct CrudService;

impl CrudService {
    /// Insert one row (plus cascaded parents). Returns `{<plural>: {id: {...}}, ...}`.
    pub async fn create(
        pool: &SqlitePool,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        options: Option<&Value>,
    ) -> Result<Value, AppError> {
        create::create(pool, model, entity, options).await
    }

    /// Paginated read. `None` criteria means the first page of everything.
    pub async fn find(
        pool: &SqlitePool,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        criteria: Option<&Value>,
    ) -> Result<FindResult, AppError> {
        find::find(pool, model, entity, criteria).await
    }

    /// Update the rows matched by `criteria`; returns their ids ascending.
    pub async fn update(
        pool: &SqlitePool,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        update: Option<&Value>,
        criteria: Option<&Value>,
    ) -> Result<Vec<i64>, AppError> {
        update::update(pool, model, entity, update, criteria).await
    }

    /// Delete the rows matched by `criteria` and everything depending on them.
    pub async fn delete(
        pool: &SqlitePool,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        criteria: Option<&Value>,
    ) -> Result<BTreeMap<String, Vec<i64>>, AppError> {
        delete::delete(pool, model, entity, criteria).await
    }
}
