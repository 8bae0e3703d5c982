//! Delete pipeline: resolve ids, walk the dependency graph, then delete leaves first in one transaction.

use crate::config::{OnDelete, ResolvedEntity, ResolvedModel};
use crate::criteria::Criteria;
use crate::error::{AppError, ConfigError};
use crate::service::common::{now, resolve_ids};
use crate::sql::{qualified, Delete, Predicate, QueryBuf, Select, Update};
use crate::store::Driver;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Entity name → ids to remove. Each id appears once however many paths reach it.
pub type DeleteSet = BTreeMap<String, BTreeSet<i64>>;

pub fn validate(criteria: Option<&Value>) -> Result<Criteria, AppError> {
    match criteria {
        None | Some(Value::Null) => Err(AppError::Shape("No criteria object passed".into())),
        Some(v) => Criteria::from_value(v),
    }
}

fn related<'m>(model: &'m ResolvedModel, name: &str) -> Result<&'m ResolvedEntity, AppError> {
    model.entity(name).ok_or_else(|| {
        AppError::Config(ConfigError::MissingReference {
            kind: "entity",
            id: name.to_string(),
        })
    })
}

/// Breadth-first over cascade edges starting at the rows matched by `criteria`.
pub async fn collect(
    conn: &mut SqliteConnection,
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    criteria: &Criteria,
) -> Result<DeleteSet, AppError> {
    let mut visited = DeleteSet::new();
    let mut queue = VecDeque::new();
    queue.push_back((entity.name.clone(), resolve_ids(conn, entity, criteria).await?));

    while let Some((name, ids)) = queue.pop_front() {
        let seen = visited.entry(name.clone()).or_default();
        let fresh: Vec<i64> = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        if fresh.is_empty() {
            continue;
        }
        for d in model.dependents_of(&name) {
            if d.on_delete != OnDelete::Cascade {
                continue;
            }
            let dep = related(model, &d.entity)?;
            let q = Select::from(&dep.table)
                .field_as(qualified(&dep.table, &dep.id), "id")
                .filter(Predicate::id_in(&dep.table, &d.attribute, &fresh))
                .build();
            let children: Vec<i64> = conn
                .all(&q)
                .await?
                .iter()
                .filter_map(|r| r.get("id").and_then(Value::as_i64))
                .collect();
            if !children.is_empty() {
                queue.push_back((d.entity.clone(), children));
            }
        }
    }
    visited.retain(|_, ids| !ids.is_empty());
    Ok(visited)
}

/// Nulling of set-null references, then join-table rows, then the rows themselves leaves first.
pub fn build_query(model: &ResolvedModel, targets: &DeleteSet) -> Result<Vec<QueryBuf>, AppError> {
    let timestamp = now();
    let mut queries = Vec::new();
    for (name, ids) in targets {
        let ids: Vec<i64> = ids.iter().copied().collect();
        for d in model.dependents_of(name).iter().filter(|d| d.on_delete == OnDelete::SetNull) {
            let dep = related(model, &d.entity)?;
            queries.push(
                Update::table(&dep.table)
                    .set(&d.attribute, Value::Null)
                    .set(&dep.modified_at, Value::from(timestamp.as_str()))
                    .filter(Predicate::id_in(&dep.table, &d.attribute, &ids))
                    .build(),
            );
        }
        for link in model.links_of(name) {
            queries.push(
                Delete::from(&link.join_table)
                    .filter(Predicate::id_in(&link.join_table, &link.column, &ids))
                    .build(),
            );
        }
    }
    for name in &model.delete_order {
        let Some(ids) = targets.get(name) else {
            continue;
        };
        let entity = related(model, name)?;
        let ids: Vec<i64> = ids.iter().copied().collect();
        queries.push(
            Delete::from(&entity.table)
                .filter(Predicate::id_in(&entity.table, &entity.id, &ids))
                .build(),
        );
    }
    Ok(queries)
}

pub async fn execute(conn: &mut SqliteConnection, queries: &[QueryBuf]) -> Result<(), AppError> {
    for q in queries {
        conn.run(q).await?;
    }
    Ok(())
}

/// `{<plural>: [ids...]}` for every entity that lost at least one row.
pub fn build_return_object(model: &ResolvedModel, targets: &DeleteSet) -> BTreeMap<String, Vec<i64>> {
    targets
        .iter()
        .filter(|(_, ids)| !ids.is_empty())
        .filter_map(|(name, ids)| {
            model
                .entity(name)
                .map(|e| (e.plural.clone(), ids.iter().copied().collect()))
        })
        .collect()
}

pub async fn delete(
    pool: &SqlitePool,
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    criteria: Option<&Value>,
) -> Result<BTreeMap<String, Vec<i64>>, AppError> {
    let criteria = validate(criteria)?;
    let mut tx = pool.begin().await?;
    let targets = collect(&mut tx, model, entity, &criteria).await?;
    execute(&mut tx, &build_query(model, &targets)?).await?;
    tx.commit().await?;
    let out = build_return_object(model, &targets);
    tracing::info!(entity = %entity.name, deleted = ?out, "deleted");
    Ok(out)
}
