//! Config validation: referential integrity of the entity model.

use crate::config::{AttributeType, EntityRule, FullConfig, OnDelete};
use crate::error::ConfigError;
use std::collections::HashSet;

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    if config.entities.is_empty() {
        return Err(ConfigError::Validation("at least one entity required".into()));
    }

    let mut names = HashSet::new();
    let mut plurals = HashSet::new();
    let mut tables = HashSet::new();
    for e in &config.entities {
        if !names.insert(e.name.as_str()) {
            return Err(ConfigError::Duplicate { kind: "entity", name: e.name.clone() });
        }
        if !plurals.insert(e.plural.as_str()) {
            return Err(ConfigError::Duplicate { kind: "plural", name: e.plural.clone() });
        }
        if !tables.insert(e.table.as_str()) {
            return Err(ConfigError::Duplicate { kind: "table", name: e.table.clone() });
        }
    }

    for e in &config.entities {
        let mut attrs: HashSet<&str> = [e.id.as_str(), e.created_at.as_str(), e.modified_at.as_str()]
            .into_iter()
            .collect();
        if attrs.len() != 3 {
            return Err(ConfigError::Duplicate { kind: "attribute", name: format!("{}.{}", e.name, e.id) });
        }
        let relation_names = e
            .many_to_many
            .iter()
            .map(|m| m.name.as_str())
            .chain(e.one_to_many.iter().map(|o| o.name.as_str()));
        for name in e.attributes.iter().map(|a| a.name.as_str()).chain(relation_names) {
            if !attrs.insert(name) {
                return Err(ConfigError::Duplicate { kind: "attribute", name: format!("{}.{}", e.name, name) });
            }
        }

        for a in &e.attributes {
            if a.allowed.is_some() && a.type_ != AttributeType::Text {
                return Err(ConfigError::Validation(format!("{}.{}: enum values require a text attribute", e.name, a.name)));
            }
            if let Some(r) = &a.references {
                if !names.contains(r.entity.as_str()) {
                    return Err(ConfigError::MissingReference { kind: "entity", id: r.entity.clone() });
                }
                if a.type_ != AttributeType::Integer {
                    return Err(ConfigError::Validation(format!("{}.{}: references must be integer", e.name, a.name)));
                }
                if r.on_delete == OnDelete::SetNull && a.required {
                    return Err(ConfigError::Validation(format!("{}.{}: set_null on a required reference", e.name, a.name)));
                }
                if r.cascade_create && r.entity == e.name {
                    return Err(ConfigError::Validation(format!("{}.{}: cascade_create on a self reference", e.name, a.name)));
                }
            }
        }

        for m in &e.many_to_many {
            if !names.contains(m.entity.as_str()) {
                return Err(ConfigError::MissingReference { kind: "entity", id: m.entity.clone() });
            }
            if tables.contains(m.join_table.as_str()) {
                return Err(ConfigError::Duplicate { kind: "table", name: m.join_table.clone() });
            }
        }

        for o in &e.one_to_many {
            let child = config
                .entities
                .iter()
                .find(|c| c.name == o.entity)
                .ok_or_else(|| ConfigError::MissingReference { kind: "entity", id: o.entity.clone() })?;
            let points_back = child
                .attributes
                .iter()
                .any(|a| a.references.as_ref().map(|r| r.entity == e.name).unwrap_or(false));
            if !points_back {
                return Err(ConfigError::Validation(format!("{}.{}: {} has no reference to {}", e.name, o.name, o.entity, e.name)));
            }
            if !e.joins.contains(&o.entity) {
                return Err(ConfigError::Validation(format!("{}.{}: {} must be joined", e.name, o.name, o.entity)));
            }
        }

        let mut joined = HashSet::new();
        for j in &e.joins {
            if *j == e.name || !joined.insert(j.as_str()) {
                return Err(ConfigError::Duplicate { kind: "join", name: format!("{}.{}", e.name, j) });
            }
            if !names.contains(j.as_str()) {
                return Err(ConfigError::MissingReference { kind: "entity", id: j.clone() });
            }
        }

        for rule in &e.rules {
            match rule {
                EntityRule::ExactlyOneOf(list) => {
                    for name in list {
                        if !e.attributes.iter().any(|a| a.name == *name) {
                            return Err(ConfigError::MissingReference { kind: "attribute", id: format!("{}.{}", e.name, name) });
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;

    #[test]
    fn default_model_is_valid() {
        validate(&default_config()).unwrap();
    }

    #[test]
    fn rejects_unknown_reference() {
        let mut config = default_config();
        let plant = config.entities.iter_mut().find(|e| e.name == "Plant").unwrap();
        plant.attributes[3].references.as_mut().unwrap().entity = "Strain".into();
        assert!(matches!(validate(&config), Err(ConfigError::MissingReference { .. })));
    }

    #[test]
    fn rejects_set_null_on_required_reference() {
        let mut config = default_config();
        let genotype = config.entities.iter_mut().find(|e| e.name == "Genotype").unwrap();
        genotype.attributes[2].references.as_mut().unwrap().on_delete = OnDelete::SetNull;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_duplicate_attribute() {
        let mut config = default_config();
        let family = config.entities.iter_mut().find(|e| e.name == "Family").unwrap();
        family.attributes[1].name = "familyName".into();
        assert!(matches!(validate(&config), Err(ConfigError::Duplicate { .. })));
    }
}
