//! Create pipeline: validate → plan cascades → insert → echo the written rows.

use crate::config::{AttributeConfig, DefaultValue, ManyToManyConfig, ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::service::common::{exists, now, storage_value};
use crate::service::find::fetch_own;
use crate::service::validation::RequestValidator;
use crate::sql::{Insert, QueryBuf};
use crate::store::Driver;
use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeSet;

const LABEL: &str = "options";

/// One row to insert. `cascaded` foreign keys are filled with ids of rows planned earlier.
pub struct PlannedRow<'a> {
    pub entity: &'a ResolvedEntity,
    values: Vec<(&'a AttributeConfig, Value)>,
    cascaded: Vec<(&'a AttributeConfig, usize)>,
    links: Vec<(&'a ManyToManyConfig, BTreeSet<i64>)>,
}

/// Rows in insertion order; the requested entity comes last.
pub struct CreatePlan<'a> {
    pub rows: Vec<PlannedRow<'a>>,
}

fn is_given(options: &Map<String, Value>, name: &str) -> bool {
    options.get(name).map(|v| !v.is_null()).unwrap_or(false)
}

/// Whether the options describe a row of `target`: one of its fields is given (references
/// included), or one of its own cascade-create parents is described in turn.
fn describes(
    model: &ResolvedModel,
    target: &ResolvedEntity,
    options: &Map<String, Value>,
    visiting: &mut Vec<String>,
) -> bool {
    visiting.push(target.name.clone());
    let found = target.fields.iter().any(|f| {
        if is_given(options, &f.name) {
            return true;
        }
        let Some(r) = f.references.as_ref().filter(|r| r.cascade_create) else {
            return false;
        };
        if visiting.contains(&r.entity) {
            return false;
        }
        model
            .entity(&r.entity)
            .map(|parent| describes(model, parent, options, visiting))
            .unwrap_or(false)
    });
    visiting.pop();
    found
}

/// Referenced entity to create first: the id is absent, cascade-create is allowed, and the
/// options describe a row of that entity.
fn cascade_target<'a>(
    model: &'a ResolvedModel,
    attr: &AttributeConfig,
    options: &Map<String, Value>,
    visiting: &[String],
) -> Option<&'a ResolvedEntity> {
    let r = attr.references.as_ref().filter(|r| r.cascade_create)?;
    if visiting.contains(&r.entity) {
        return None;
    }
    let target = model.entity(&r.entity)?;
    describes(model, target, options, &mut visiting.to_vec()).then_some(target)
}

fn plan_row<'a>(
    model: &'a ResolvedModel,
    entity: &'a ResolvedEntity,
    options: &Map<String, Value>,
    rows: &mut Vec<PlannedRow<'a>>,
    visiting: &mut Vec<String>,
) -> Result<usize, AppError> {
    visiting.push(entity.name.clone());
    let mut row = PlannedRow {
        entity,
        values: Vec::new(),
        cascaded: Vec::new(),
        links: Vec::new(),
    };
    for attr in &entity.fields {
        let value = options.get(&attr.name).filter(|v| !v.is_null());
        if value.is_none() {
            if let Some(target) = cascade_target(model, attr, options, visiting) {
                let index = plan_row(model, target, options, rows, visiting)?;
                row.cascaded.push((attr, index));
                continue;
            }
        }
        RequestValidator::required(LABEL, attr, value)?;
        let stored = match value {
            Some(v) => {
                RequestValidator::field(LABEL, attr, v)?;
                storage_value(attr.type_, v)
            }
            None => match attr.default {
                DefaultValue::EmptyString => Value::from(""),
                DefaultValue::Null => Value::Null,
            },
        };
        row.values.push((attr, stored));
    }
    for m in &entity.many_to_many {
        if let Some(v) = options.get(&m.name) {
            row.links.push((m, RequestValidator::id_set(LABEL, &m.name, v)?));
        }
    }
    RequestValidator::rules(LABEL, entity, |name| {
        row.values.iter().any(|(a, v)| a.name == name && !v.is_null())
            || row.cascaded.iter().any(|(a, _)| a.name == name)
    })?;
    visiting.pop();
    rows.push(row);
    Ok(rows.len() - 1)
}

/// Shape, required, type and enum checks for the entity and every cascade. Nothing is written.
pub fn validate<'a>(
    model: &'a ResolvedModel,
    entity: &'a ResolvedEntity,
    options: Option<&Value>,
) -> Result<CreatePlan<'a>, AppError> {
    let options = RequestValidator::object(options, "Options Object has to be an associative array")?;
    let mut rows = Vec::new();
    plan_row(model, entity, options, &mut rows, &mut Vec::new())?;
    Ok(CreatePlan { rows })
}

pub fn build_query(row: &PlannedRow<'_>, inserted: &[i64], timestamp: &str) -> QueryBuf {
    let mut q = Insert::table(&row.entity.table);
    for (attr, v) in &row.values {
        q = q.set(&attr.name, v.clone());
    }
    for (attr, index) in &row.cascaded {
        q = q.set(&attr.name, Value::from(inserted[*index]));
    }
    q.set(&row.entity.created_at, Value::from(timestamp))
        .set(&row.entity.modified_at, Value::from(timestamp))
        .build()
}

/// Name the first foreign key of `row` that points nowhere.
async fn reference_error(
    conn: &mut SqliteConnection,
    model: &ResolvedModel,
    row: &PlannedRow<'_>,
) -> Result<Option<AppError>, AppError> {
    for (attr, v) in &row.values {
        let (Some(r), Some(id)) = (&attr.references, v.as_i64()) else {
            continue;
        };
        let Some(target) = model.entity(&r.entity) else {
            continue;
        };
        if !exists(conn, target, id).await? {
            return Ok(Some(AppError::ReferentialIntegrity(format!(
                "{}.{} does not reference an existing {}",
                LABEL, attr.name, target.name
            ))));
        }
    }
    Ok(None)
}

/// Insert join-table rows for one owner. A dangling related id aborts with a message naming it.
pub(crate) async fn insert_links(
    conn: &mut SqliteConnection,
    label: &str,
    relation: &ManyToManyConfig,
    owner: i64,
    ids: &BTreeSet<i64>,
) -> Result<(), AppError> {
    for id in ids {
        let q = Insert::table(&relation.join_table)
            .set(&relation.our_key, Value::from(owner))
            .set(&relation.their_key, Value::from(*id))
            .build();
        match conn.run(&q).await {
            Ok(_) => {}
            Err(e) if e.is_foreign_key_violation() => {
                return Err(AppError::ReferentialIntegrity(format!(
                    "{}.{} contains {} which does not reference an existing {}",
                    label, relation.name, id, relation.entity
                )))
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Insert every planned row in order; returns the new ids aligned with `plan.rows`.
pub async fn execute(
    conn: &mut SqliteConnection,
    model: &ResolvedModel,
    plan: &CreatePlan<'_>,
) -> Result<Vec<i64>, AppError> {
    let timestamp = now();
    let mut inserted = Vec::with_capacity(plan.rows.len());
    for row in &plan.rows {
        let id = match conn.run(&build_query(row, &inserted, &timestamp)).await {
            Ok(done) => done.last_insert_id,
            Err(e) if e.is_foreign_key_violation() => {
                return Err(reference_error(conn, model, row).await?.unwrap_or(e));
            }
            Err(e) => return Err(e),
        };
        for (relation, ids) in &row.links {
            insert_links(conn, LABEL, relation, id, ids).await?;
        }
        inserted.push(id);
    }
    Ok(inserted)
}

/// `{<plural>: {id: {...}}}` for the requested entity and everything created along the way.
pub async fn build_return_object(
    conn: &mut SqliteConnection,
    plan: &CreatePlan<'_>,
    inserted: &[i64],
) -> Result<Value, AppError> {
    let mut out = Map::new();
    for (row, id) in plan.rows.iter().zip(inserted) {
        let objs = fetch_own(conn, row.entity, &[*id]).await?;
        let bucket = out
            .entry(row.entity.plural.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(bucket) = bucket {
            bucket.extend(objs);
        }
    }
    Ok(Value::Object(out))
}

pub async fn create(
    pool: &SqlitePool,
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    options: Option<&Value>,
) -> Result<Value, AppError> {
    let plan = validate(model, entity, options)?;
    let mut tx = pool.begin().await?;
    let inserted = execute(&mut tx, model, &plan).await?;
    let out = build_return_object(&mut tx, &plan, &inserted).await?;
    tx.commit().await?;
    tracing::info!(entity = %entity.name, ids = ?inserted, "created");
    Ok(out)
}
