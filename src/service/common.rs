//! Pieces shared by the pipelines: id resolution, reference probes, value conversion.

use crate::config::{AttributeType, ResolvedEntity};
use crate::criteria::{Criteria, FilterEngine};
use crate::error::AppError;
use crate::sql::{qualified, Predicate, Select};
use crate::store::Driver;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use sqlx::SqliteConnection;

/// Timestamp written to createdAt/modifiedAt.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `FROM table` plus every declared LEFT JOIN.
pub(crate) fn base_select(entity: &ResolvedEntity) -> Select {
    entity.joins.iter().fold(Select::from(&entity.table), |q, j| {
        q.left_join(&j.table, &j.column, &j.left_table, &j.left_column)
    })
}

/// Apply the criteria's where clause, if it yields anything.
pub(crate) fn filtered(entity: &ResolvedEntity, q: Select, criteria: &Criteria) -> Select {
    match FilterEngine::new(entity).predicate(&criteria.filter) {
        Some(p) => q.filter(p),
        None => q,
    }
}

/// Caller sort first, primary id ascending as the tie-breaker.
pub(crate) fn ordered(entity: &ResolvedEntity, q: Select, criteria: &Criteria) -> Select {
    let id = qualified(&entity.table, &entity.id);
    let sort = criteria
        .sort
        .as_ref()
        .and_then(|s| FilterEngine::new(entity).order_by(s));
    let q = match sort {
        Some(expr) => q.order(expr),
        None => q,
    };
    q.order(format!("{} ASC", id))
}

/// Ids of the primary entity matching the criteria, in sort order, honouring limit/offset.
pub(crate) async fn resolve_ids(
    conn: &mut SqliteConnection,
    entity: &ResolvedEntity,
    criteria: &Criteria,
) -> Result<Vec<i64>, AppError> {
    let id = qualified(&entity.table, &entity.id);
    let mut q = filtered(entity, base_select(entity), criteria)
        .field_as(&id, "id")
        .group(&id);
    q = ordered(entity, q, criteria);
    if let Some(limit) = criteria.limit {
        q = q.limit(limit);
    }
    if let Some(offset) = criteria.offset {
        q = q.offset(offset);
    }
    let rows = conn.all(&q.build()).await?;
    Ok(rows.iter().filter_map(|r| r.get("id").and_then(Value::as_i64)).collect())
}

/// Whether a row with this id exists in `target`.
pub(crate) async fn exists(conn: &mut SqliteConnection, target: &ResolvedEntity, id: i64) -> Result<bool, AppError> {
    let q = Select::from(&target.table)
        .field("1 AS found")
        .filter(Predicate::id_in(&target.table, &target.id, &[id]))
        .limit(1)
        .build();
    Ok(conn.get(&q).await?.is_some())
}

/// Value as stored: JSON attributes are kept as JSON text.
pub(crate) fn storage_value(type_: AttributeType, v: &Value) -> Value {
    match (type_, v) {
        (_, Value::Null) => Value::Null,
        (AttributeType::Json, v) => Value::String(v.to_string()),
        (_, v) => v.clone(),
    }
}

/// Value as returned to the caller.
pub(crate) fn decode(type_: AttributeType, v: Value) -> Value {
    match (type_, v) {
        (AttributeType::Json, Value::String(s)) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        (AttributeType::Boolean, Value::Number(n)) => Value::Bool(n.as_i64().map(|i| i != 0).unwrap_or(false)),
        (_, v) => v,
    }
}

/// `GROUP_CONCAT` output as a sorted id list.
pub(crate) fn id_list(v: &Value) -> Vec<i64> {
    let mut ids: Vec<i64> = match v {
        Value::String(s) => s.split(',').filter_map(|p| p.trim().parse().ok()).collect(),
        Value::Number(n) => n.as_i64().into_iter().collect(),
        _ => Vec::new(),
    };
    ids.sort_unstable();
    ids.dedup();
    ids
}
