//! Find pipeline: joined, filtered, grouped, paginated read with a concurrent count.

use crate::config::{AttributeInfo, AttributeRole, Cardinality, ResolvedEntity, ResolvedJoin, ResolvedModel};
use crate::criteria::{Criteria, DEFAULT_LIMIT};
use crate::error::AppError;
use crate::service::common::{base_select, decode, filtered, id_list, ordered};
use crate::sql::{qualified, quoted, Predicate, QueryBuf, Select};
use crate::store::{Driver, Row};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;

/// `{found, remaining, <plural>: {id: {...}}, ...}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FindResult {
    pub found: u64,
    pub remaining: u64,
    #[serde(flatten)]
    pub entities: Map<String, Value>,
}

/// Ids count as references, never as the descriptive part of a joined entity.
fn is_id_like(info: &AttributeInfo) -> bool {
    matches!(info.role, AttributeRole::Id | AttributeRole::Reference { .. })
}

fn select_expr(info: &AttributeInfo) -> String {
    match &info.role {
        AttributeRole::ManyToMany { join_table, our_key, their_key } => format!(
            "(SELECT GROUP_CONCAT({}) FROM {} WHERE {} = {})",
            qualified(join_table, their_key),
            quoted(join_table),
            qualified(join_table, our_key),
            qualified(&info.table, &info.table_id)
        ),
        AttributeRole::OneToMany { table, id } => format!("GROUP_CONCAT(DISTINCT {})", qualified(table, id)),
        _ => qualified(&info.table, &info.name),
    }
}

fn output_value(info: &AttributeInfo, v: Option<&Value>) -> Value {
    let v = v.cloned().unwrap_or(Value::Null);
    match info.role {
        AttributeRole::ManyToMany { .. } | AttributeRole::OneToMany { .. } => {
            Value::Array(id_list(&v).into_iter().map(Value::from).collect())
        }
        _ => decode(info.type_, v),
    }
}

struct Bucket<'a> {
    plural: &'a str,
    join: &'a ResolvedJoin,
    alias: String,
    attributes: Vec<&'a AttributeInfo>,
}

/// Which attributes are selected and how each row splits into per-entity objects.
pub struct Projection<'a> {
    entity: &'a ResolvedEntity,
    primary: Vec<&'a AttributeInfo>,
    buckets: Vec<Bucket<'a>>,
}

impl<'a> Projection<'a> {
    /// Requested attributes, or the entity's own plus the ids of its many-to-one joins.
    pub fn new(model: &'a ResolvedModel, entity: &'a ResolvedEntity, requested: Option<&[String]>) -> Self {
        let names: Vec<&str> = match requested {
            Some(names) => names.iter().map(String::as_str).collect(),
            None => entity
                .own_attributes
                .iter()
                .map(String::as_str)
                .chain(
                    entity
                        .joins
                        .iter()
                        .filter(|j| j.cardinality == Cardinality::ManyToOne)
                        .map(|j| j.id.as_str()),
                )
                .collect(),
        };

        let mut selected: Vec<&AttributeInfo> = Vec::new();
        for name in std::iter::once(entity.id.as_str()).chain(names) {
            match entity.attribute(name) {
                Some(info) if !selected.iter().any(|s| s.name == info.name) => selected.push(info),
                Some(_) => {}
                None => tracing::warn!(entity = %entity.name, attribute = %name, "ignoring unknown attribute"),
            }
        }

        let mut buckets: Vec<Bucket> = Vec::new();
        for info in selected.iter().filter(|i| i.owner != entity.name && !is_id_like(i)) {
            if buckets.iter().any(|b| b.join.entity == info.owner) {
                continue;
            }
            let (Some(join), Some(related)) = (entity.join(&info.owner), model.entity(&info.owner)) else {
                continue;
            };
            buckets.push(Bucket {
                plural: &related.plural,
                join,
                alias: format!("{}.{}", join.table, join.id),
                attributes: Vec::new(),
            });
        }
        for b in &mut buckets {
            b.attributes = selected.iter().copied().filter(|i| i.owner == b.join.entity).collect();
        }

        let primary = selected
            .into_iter()
            .filter(|i| i.owner == entity.name || is_id_like(i))
            .collect();
        Projection {
            entity,
            primary,
            buckets,
        }
    }

    fn apply(&self, mut q: Select) -> Select {
        for info in &self.primary {
            q = q.field_as(select_expr(info), &info.name);
        }
        for b in &self.buckets {
            q = q.field_as(qualified(&b.join.table, &b.join.id), &b.alias);
            for info in b.attributes.iter().filter(|i| !self.primary.iter().any(|p| p.name == i.name)) {
                q = q.field_as(select_expr(info), &info.name);
            }
        }
        q
    }

    /// Rows → `{<plural>: {id: {...}}, <relatedPlural>: {...}}`; empty related buckets are left out.
    fn assemble(&self, rows: &[Row]) -> Map<String, Value> {
        let mut out: BTreeMap<&str, Map<String, Value>> = BTreeMap::new();
        out.insert(self.entity.plural.as_str(), Map::new());
        for row in rows {
            let Some(id) = row.get(&self.entity.id).and_then(Value::as_i64) else {
                continue;
            };
            let obj: Map<String, Value> = self
                .primary
                .iter()
                .map(|i| (i.name.clone(), output_value(i, row.get(&i.name))))
                .collect();
            out.entry(self.entity.plural.as_str())
                .or_default()
                .insert(id.to_string(), Value::Object(obj));

            for b in &self.buckets {
                let Some(related_id) = row.get(&b.alias).and_then(Value::as_i64) else {
                    continue;
                };
                let mut obj = Map::new();
                obj.insert(b.join.id.clone(), Value::from(related_id));
                for i in &b.attributes {
                    obj.insert(i.name.clone(), output_value(i, row.get(&i.name)));
                }
                out.entry(b.plural).or_default().insert(related_id.to_string(), Value::Object(obj));
            }
        }
        out.into_iter()
            .filter(|(plural, objs)| *plural == self.entity.plural || !objs.is_empty())
            .map(|(plural, objs)| (plural.to_string(), Value::Object(objs)))
            .collect()
    }
}

pub fn validate(criteria: Option<&Value>) -> Result<Criteria, AppError> {
    match criteria {
        None | Some(Value::Null) => Ok(Criteria::default()),
        Some(v) => Criteria::from_value(v),
    }
}

/// The page query and its count query. The count is taken from the filtered base before any
/// projection, grouping or pagination.
pub fn build_query(entity: &ResolvedEntity, projection: &Projection<'_>, criteria: &Criteria) -> (QueryBuf, QueryBuf) {
    let id = qualified(&entity.table, &entity.id);
    let base = filtered(entity, base_select(entity), criteria);
    let count = base
        .clone()
        .field_as(format!("COUNT(DISTINCT {})", id), "found")
        .build();

    let mut q = projection.apply(base).group(&id);
    q = ordered(entity, q, criteria);
    q = q.limit(criteria.limit.unwrap_or(DEFAULT_LIMIT));
    if let Some(offset) = criteria.offset {
        q = q.offset(offset);
    }
    (q.build(), count)
}

/// Runs the page and the count concurrently.
pub async fn execute(pool: &SqlitePool, rows: &QueryBuf, count: &QueryBuf) -> Result<(Vec<Row>, u64), AppError> {
    let page = async {
        let mut conn = pool.acquire().await?;
        conn.all(rows).await
    };
    let total = async {
        let mut conn = pool.acquire().await?;
        conn.get(count).await
    };
    let (rows, total) = tokio::try_join!(page, total)?;
    let found = total
        .and_then(|r| r.get("found").and_then(Value::as_u64))
        .unwrap_or(0);
    Ok((rows, found))
}

pub fn build_return_object(projection: &Projection<'_>, criteria: &Criteria, rows: &[Row], found: u64) -> FindResult {
    let offset = criteria.offset.unwrap_or(0);
    let returned = rows.len() as u64;
    FindResult {
        found,
        remaining: found.saturating_sub(offset).saturating_sub(returned),
        entities: projection.assemble(rows),
    }
}

pub async fn find(
    pool: &SqlitePool,
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    criteria: Option<&Value>,
) -> Result<FindResult, AppError> {
    let criteria = validate(criteria)?;
    let projection = Projection::new(model, entity, criteria.attributes.as_deref());
    let (rows_q, count_q) = build_query(entity, &projection, &criteria);
    let (rows, found) = execute(pool, &rows_q, &count_q).await?;
    Ok(build_return_object(&projection, &criteria, &rows, found))
}

/// Own attributes of the given rows, keyed by id. Used to echo freshly written rows.
pub(crate) async fn fetch_own(
    conn: &mut SqliteConnection,
    entity: &ResolvedEntity,
    ids: &[i64],
) -> Result<Map<String, Value>, AppError> {
    let infos: Vec<&AttributeInfo> = entity
        .own_attributes
        .iter()
        .filter_map(|n| entity.attribute(n))
        .collect();
    let id = qualified(&entity.table, &entity.id);
    let q = infos
        .iter()
        .fold(base_select(entity), |q, i| q.field_as(select_expr(i), &i.name))
        .filter(Predicate::id_in(&entity.table, &entity.id, ids))
        .group(&id)
        .order(format!("{} ASC", id))
        .build();
    let rows = conn.all(&q).await?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            let id = row.get(&entity.id).and_then(Value::as_i64)?;
            let obj: Map<String, Value> = infos
                .iter()
                .map(|i| (i.name.clone(), output_value(i, row.get(&i.name))))
                .collect();
            Some((id.to_string(), Value::Object(obj)))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_config, resolve};

    #[test]
    fn default_projection_has_no_joined_buckets() {
        let model = resolve(&default_config()).unwrap();
        let plant = model.entity("Plant").unwrap();
        let p = Projection::new(&model, plant, None);
        assert!(p.buckets.is_empty());
        let names: Vec<&str> = p.primary.iter().map(|i| i.name.as_str()).collect();
        for n in ["plantId", "plantName", "genotypeId", "generationId", "familyId", "mediumId", "environmentId"] {
            assert!(names.contains(&n), "{} missing", n);
        }
    }

    #[test]
    fn joined_attribute_opens_a_bucket() {
        let model = resolve(&default_config()).unwrap();
        let plant = model.entity("Plant").unwrap();
        let requested = vec!["plantName".to_string(), "familyName".to_string(), "bogus".to_string()];
        let p = Projection::new(&model, plant, Some(&requested));
        assert_eq!(p.buckets.len(), 1);
        assert_eq!(p.buckets[0].plural, "families");
        assert_eq!(p.buckets[0].alias, "families.familyId");
    }

    #[test]
    fn count_ignores_pagination() {
        let model = resolve(&default_config()).unwrap();
        let family = model.entity("Family").unwrap();
        let criteria = Criteria::from_value(&serde_json::json!({"limit": 2, "offset": 1})).unwrap();
        let p = Projection::new(&model, family, None);
        let (rows, count) = build_query(family, &p, &criteria);
        assert!(rows.sql.ends_with("LIMIT 2 OFFSET 1"));
        assert!(rows.sql.contains("GROUP_CONCAT(DISTINCT \"generations\".\"generationId\") AS \"familyGenerations\""));
        assert!(count.sql.starts_with("SELECT COUNT(DISTINCT \"families\".\"familyId\") AS \"found\""));
        assert!(!count.sql.contains("LIMIT"));
    }
}
