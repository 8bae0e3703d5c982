//! Load the entity model from JSON and resolve it for runtime use.

use crate::config::resolved::*;
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Build resolved model from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let configs_by_name: HashMap<&str, &EntityConfig> =
        config.entities.iter().map(|e| (e.name.as_str(), e)).collect();

    let mut entities = Vec::with_capacity(config.entities.len());
    let mut by_name = HashMap::new();
    let mut by_plural = HashMap::new();
    for (i, e) in config.entities.iter().enumerate() {
        let joins = resolve_joins(e, &configs_by_name)?;
        let mut attributes = HashMap::new();
        let own_attributes = insert_own_attributes(&mut attributes, e, &joins);
        for j in &joins {
            let related = configs_by_name[j.entity.as_str()];
            insert_own_attributes(&mut attributes, related, &[]);
        }
        entities.push(ResolvedEntity {
            name: e.name.clone(),
            plural: e.plural.clone(),
            table: e.table.clone(),
            id: e.id.clone(),
            created_at: e.created_at.clone(),
            modified_at: e.modified_at.clone(),
            fields: e.attributes.clone(),
            many_to_many: e.many_to_many.clone(),
            one_to_many: e.one_to_many.clone(),
            joins,
            attributes,
            own_attributes,
            rules: e.rules.clone(),
        });
        by_name.insert(e.name.clone(), i);
        by_plural.insert(e.plural.clone(), i);
    }

    let mut dependents: HashMap<String, Vec<Dependent>> = HashMap::new();
    let mut links: HashMap<String, Vec<LinkRows>> = HashMap::new();
    for e in &config.entities {
        for a in &e.attributes {
            if let Some(r) = &a.references {
                dependents.entry(r.entity.clone()).or_default().push(Dependent {
                    entity: e.name.clone(),
                    attribute: a.name.clone(),
                    on_delete: r.on_delete,
                });
            }
        }
        for m in &e.many_to_many {
            links.entry(e.name.clone()).or_default().push(LinkRows {
                join_table: m.join_table.clone(),
                column: m.our_key.clone(),
            });
            links.entry(m.entity.clone()).or_default().push(LinkRows {
                join_table: m.join_table.clone(),
                column: m.their_key.clone(),
            });
        }
    }

    let delete_order = delete_order(config, &dependents)?;

    Ok(ResolvedModel {
        entities,
        by_name,
        by_plural,
        dependents,
        links,
        delete_order,
    })
}

/// Adds the entity's own attributes unless a name is already mapped (earlier tables win).
/// Returns the names in default projection order.
fn insert_own_attributes(
    attributes: &mut HashMap<String, AttributeInfo>,
    e: &EntityConfig,
    joins: &[ResolvedJoin],
) -> Vec<String> {
    let info = |name: &str, type_: AttributeType, role: AttributeRole| AttributeInfo {
        name: name.to_string(),
        owner: e.name.clone(),
        table: e.table.clone(),
        table_id: e.id.clone(),
        type_,
        role,
    };

    let mut own = vec![info(&e.id, AttributeType::Integer, AttributeRole::Id)];
    for a in &e.attributes {
        let role = match &a.references {
            Some(r) => AttributeRole::Reference { entity: r.entity.clone() },
            None => AttributeRole::Field,
        };
        own.push(info(&a.name, a.type_, role));
    }
    for m in &e.many_to_many {
        own.push(info(
            &m.name,
            AttributeType::Integer,
            AttributeRole::ManyToMany {
                join_table: m.join_table.clone(),
                our_key: m.our_key.clone(),
                their_key: m.their_key.clone(),
            },
        ));
    }
    for o in &e.one_to_many {
        // Only projected when the child is joined; validation guarantees it is for the primary.
        if let Some(j) = joins.iter().find(|j| j.entity == o.entity) {
            own.push(info(
                &o.name,
                AttributeType::Integer,
                AttributeRole::OneToMany { table: j.table.clone(), id: j.id.clone() },
            ));
        }
    }
    own.push(info(&e.created_at, AttributeType::Timestamp, AttributeRole::CreatedAt));
    own.push(info(&e.modified_at, AttributeType::Timestamp, AttributeRole::ModifiedAt));

    let names = own.iter().map(|a| a.name.clone()).collect();
    for a in own {
        attributes.entry(a.name.clone()).or_insert(a);
    }
    names
}

/// Each join attaches to the primary or an earlier join, preferring a reference held by the
/// already-joined side over one pointing back at it.
fn resolve_joins(
    e: &EntityConfig,
    configs: &HashMap<&str, &EntityConfig>,
) -> Result<Vec<ResolvedJoin>, ConfigError> {
    let mut joined: Vec<&EntityConfig> = vec![e];
    let mut out = Vec::with_capacity(e.joins.len());
    for target_name in &e.joins {
        let target = configs[target_name.as_str()];
        let mut found = None;
        for left in &joined {
            if let Some(fk) = reference_to(left, &target.name) {
                found = Some(ResolvedJoin {
                    entity: target.name.clone(),
                    table: target.table.clone(),
                    id: target.id.clone(),
                    column: target.id.clone(),
                    left_table: left.table.clone(),
                    left_column: fk.to_string(),
                    cardinality: Cardinality::ManyToOne,
                });
                break;
            }
            if let Some(fk) = reference_to(target, &left.name) {
                found = Some(ResolvedJoin {
                    entity: target.name.clone(),
                    table: target.table.clone(),
                    id: target.id.clone(),
                    column: fk.to_string(),
                    left_table: left.table.clone(),
                    left_column: left.id.clone(),
                    cardinality: Cardinality::OneToMany,
                });
                break;
            }
        }
        let join = found.ok_or_else(|| ConfigError::UnreachableJoin {
            entity: e.name.clone(),
            target: target.name.clone(),
        })?;
        out.push(join);
        joined.push(target);
    }
    Ok(out)
}

fn reference_to<'a>(from: &'a EntityConfig, to: &str) -> Option<&'a str> {
    from.attributes
        .iter()
        .find(|a| a.references.as_ref().map(|r| r.entity == to).unwrap_or(false))
        .map(|a| a.name.as_str())
}

/// Topological order over cascade edges, children before parents. Set-null and self edges
/// do not constrain the order.
fn delete_order(
    config: &FullConfig,
    dependents: &HashMap<String, Vec<Dependent>>,
) -> Result<Vec<String>, ConfigError> {
    fn visit(
        name: &str,
        dependents: &HashMap<String, Vec<Dependent>>,
        done: &mut HashSet<String>,
        active: &mut HashSet<String>,
        out: &mut Vec<String>,
    ) -> Result<(), ConfigError> {
        if done.contains(name) {
            return Ok(());
        }
        if !active.insert(name.to_string()) {
            return Err(ConfigError::CascadeCycle(name.to_string()));
        }
        for d in dependents.get(name).map(Vec::as_slice).unwrap_or(&[]) {
            if d.on_delete == OnDelete::Cascade && d.entity != name {
                visit(&d.entity, dependents, done, active, out)?;
            }
        }
        active.remove(name);
        done.insert(name.to_string());
        out.push(name.to_string());
        Ok(())
    }

    let mut done = HashSet::new();
    let mut active = HashSet::new();
    let mut out = Vec::with_capacity(config.entities.len());
    for e in &config.entities {
        visit(&e.name, dependents, &mut done, &mut active, &mut out)?;
    }
    Ok(out)
}

/// Load an entity model from a JSON file shaped like [`FullConfig`].
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let raw = tokio::fs::read_to_string(path.as_ref())
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.as_ref().display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(e.to_string()))
}
