//! Update pipeline: validate → resolve target ids → reference checks → update by id → relation replace.

use crate::config::{AttributeConfig, ManyToManyConfig, ResolvedEntity, ResolvedModel};
use crate::criteria::Criteria;
use crate::error::AppError;
use crate::service::common::{exists, now, resolve_ids, storage_value};
use crate::service::create::insert_links;
use crate::service::validation::RequestValidator;
use crate::sql::{qualified, Delete, Predicate, QueryBuf, Select, Update};
use crate::store::Driver;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeSet;

const LABEL: &str = "update";

pub struct UpdatePlan<'a> {
    values: Vec<(&'a AttributeConfig, Value)>,
    links: Vec<(&'a ManyToManyConfig, BTreeSet<i64>)>,
    criteria: Criteria,
}

impl UpdatePlan<'_> {
    /// Nothing left to write once protected and unknown keys are dropped.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.links.is_empty()
    }
}

pub fn validate<'a>(
    entity: &'a ResolvedEntity,
    update: Option<&Value>,
    criteria: Option<&Value>,
) -> Result<UpdatePlan<'a>, AppError> {
    let update = match update {
        None | Some(Value::Null) => {
            return Err(AppError::Shape("No Update and Criteria Object got passed".into()))
        }
        Some(v) => v
            .as_object()
            .ok_or_else(|| AppError::Shape("Update Object has to be an associative array".into()))?,
    };
    let criteria = match criteria {
        None | Some(Value::Null) => return Err(AppError::Shape("No Criteria Object got passed".into())),
        Some(v) => Criteria::from_value(v)?,
    };

    let mut values = Vec::new();
    let mut links = Vec::new();
    for (key, v) in update {
        if entity.is_protected(key) {
            tracing::debug!(entity = %entity.name, attribute = %key, "dropping protected attribute from update");
            continue;
        }
        if let Some(attr) = entity.field(key) {
            if attr.required && v.is_null() {
                return Err(AppError::RequiredField(format!("{}.{} has to be set", LABEL, key)));
            }
            RequestValidator::field(LABEL, attr, v)?;
            values.push((attr, storage_value(attr.type_, v)));
        } else if let Some(m) = entity.many_to_many(key) {
            links.push((m, RequestValidator::id_set(LABEL, key, v)?));
        } else {
            tracing::warn!(entity = %entity.name, attribute = %key, "ignoring unknown update attribute");
        }
    }
    Ok(UpdatePlan { values, links, criteria })
}

/// `UPDATE ... SET ..., modifiedAt = ? WHERE id IN (ids)`.
pub fn build_query(entity: &ResolvedEntity, plan: &UpdatePlan<'_>, ids: &[i64], timestamp: &str) -> QueryBuf {
    plan.values
        .iter()
        .fold(Update::table(&entity.table), |q, (attr, v)| q.set(&attr.name, v.clone()))
        .set(&entity.modified_at, Value::from(timestamp))
        .filter(Predicate::id_in(&entity.table, &entity.id, ids))
        .build()
}

/// Every non-null foreign key in the update has to point at an existing row.
async fn check_references(
    conn: &mut SqliteConnection,
    model: &ResolvedModel,
    plan: &UpdatePlan<'_>,
) -> Result<(), AppError> {
    for (attr, v) in &plan.values {
        let (Some(r), Some(id)) = (&attr.references, v.as_i64()) else {
            continue;
        };
        let Some(target) = model.entity(&r.entity) else {
            continue;
        };
        if !exists(conn, target, id).await? {
            return Err(AppError::ReferentialIntegrity(format!(
                "{}.{} does not reference an existing {}",
                LABEL, attr.name, target.name
            )));
        }
    }
    Ok(())
}

/// Entity rules hold for every target row after the update is merged in.
async fn check_rules(
    conn: &mut SqliteConnection,
    entity: &ResolvedEntity,
    plan: &UpdatePlan<'_>,
    ids: &[i64],
) -> Result<(), AppError> {
    if entity.rules.is_empty() {
        return Ok(());
    }
    let q = entity
        .fields
        .iter()
        .fold(Select::from(&entity.table), |q, f| q.field(qualified(&entity.table, &f.name)))
        .filter(Predicate::id_in(&entity.table, &entity.id, ids))
        .build();
    for row in conn.all(&q).await? {
        RequestValidator::rules(LABEL, entity, |name| {
            match plan.values.iter().find(|(a, _)| a.name == name) {
                Some((_, v)) => !v.is_null(),
                None => row.get(name).map(|v| !v.is_null()).unwrap_or(false),
            }
        })?;
    }
    Ok(())
}

/// Returns the updated ids, ascending.
pub async fn execute(
    conn: &mut SqliteConnection,
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    plan: &UpdatePlan<'_>,
) -> Result<Vec<i64>, AppError> {
    check_references(conn, model, plan).await?;
    let mut ids = resolve_ids(conn, entity, &plan.criteria).await?;
    ids.sort_unstable();
    if ids.is_empty() {
        return Ok(ids);
    }
    check_rules(conn, entity, plan, &ids).await?;

    conn.run(&build_query(entity, plan, &ids, &now())).await?;
    for (relation, set) in &plan.links {
        let clear = Delete::from(&relation.join_table)
            .filter(Predicate::id_in(&relation.join_table, &relation.our_key, &ids))
            .build();
        conn.run(&clear).await?;
        for id in &ids {
            insert_links(conn, LABEL, relation, *id, set).await?;
        }
    }
    Ok(ids)
}

pub async fn update(
    pool: &SqlitePool,
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    update: Option<&Value>,
    criteria: Option<&Value>,
) -> Result<Vec<i64>, AppError> {
    let plan = validate(entity, update, criteria)?;
    if plan.is_empty() {
        return Ok(Vec::new());
    }
    let mut tx = pool.begin().await?;
    let ids = execute(&mut tx, model, entity, &plan).await?;
    tx.commit().await?;
    tracing::info!(entity = %entity.name, ids = ?ids, "updated");
    Ok(ids)
}
