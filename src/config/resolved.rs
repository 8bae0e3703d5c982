//! Resolved entity model: config validated and flattened for runtime use.

use crate::config::{AttributeConfig, AttributeType, EntityRule, ManyToManyConfig, OnDelete, OneToManyConfig};
use std::collections::HashMap;

/// Direction of a declared join, seen from the already-joined side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    /// The joined side holds the referenced id (we have an FK to them).
    ManyToOne,
    /// The joined side references us (they have an FK to us).
    OneToMany,
}

/// One `LEFT JOIN "table" ON "table"."column" = "left_table"."left_column"`.
#[derive(Clone, Debug)]
pub struct ResolvedJoin {
    pub entity: String,
    pub table: String,
    pub id: String,
    pub column: String,
    pub left_table: String,
    pub left_column: String,
    pub cardinality: Cardinality,
}

/// What an attribute means to the entity that owns it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeRole {
    Id,
    CreatedAt,
    ModifiedAt,
    Field,
    Reference { entity: String },
    ManyToMany { join_table: String, our_key: String, their_key: String },
    OneToMany { table: String, id: String },
}

/// Where a searchable attribute lives: the static attribute→table map entry.
#[derive(Clone, Debug)]
pub struct AttributeInfo {
    pub name: String,
    /// Entity that declares the attribute.
    pub owner: String,
    /// Table (or join alias) the column is read from in find queries.
    pub table: String,
    /// Id column of `table`, used by relation subqueries.
    pub table_id: String,
    pub type_: AttributeType,
    pub role: AttributeRole,
}

impl AttributeInfo {
    /// Plain column reference; None for aggregated relation attributes.
    pub fn column(&self) -> Option<&str> {
        match self.role {
            AttributeRole::ManyToMany { .. } | AttributeRole::OneToMany { .. } => None,
            _ => Some(self.name.as_str()),
        }
    }

    pub fn is_id(&self) -> bool {
        self.role == AttributeRole::Id
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub name: String,
    pub plural: String,
    pub table: String,
    pub id: String,
    pub created_at: String,
    pub modified_at: String,
    /// Writable own columns in declaration order.
    pub fields: Vec<AttributeConfig>,
    pub many_to_many: Vec<ManyToManyConfig>,
    pub one_to_many: Vec<OneToManyConfig>,
    pub joins: Vec<ResolvedJoin>,
    /// Searchable attributes: own first, then each joined entity's in join order.
    pub attributes: HashMap<String, AttributeInfo>,
    /// Default projection of the entity itself.
    pub own_attributes: Vec<String>,
    pub rules: Vec<EntityRule>,
}

impl ResolvedEntity {
    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.get(name)
    }

    pub fn field(&self, name: &str) -> Option<&AttributeConfig> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn many_to_many(&self, name: &str) -> Option<&ManyToManyConfig> {
        self.many_to_many.iter().find(|m| m.name == name)
    }

    pub fn is_protected(&self, name: &str) -> bool {
        name == self.id || name == self.created_at || name == self.modified_at
    }

    /// Fields holding a foreign key, with the referenced entity.
    pub fn references(&self) -> impl Iterator<Item = (&AttributeConfig, &str)> {
        self.fields
            .iter()
            .filter_map(|f| f.references.as_ref().map(|r| (f, r.entity.as_str())))
    }

    pub fn join(&self, entity: &str) -> Option<&ResolvedJoin> {
        self.joins.iter().find(|j| j.entity == entity)
    }
}

/// An (entity, foreign key) edge of the ownership graph.
#[derive(Clone, Debug)]
pub struct Dependent {
    pub entity: String,
    pub attribute: String,
    pub on_delete: OnDelete,
}

/// Join-table rows keyed by an entity's id, removed together with it.
#[derive(Clone, Debug)]
pub struct LinkRows {
    pub join_table: String,
    pub column: String,
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    pub(crate) by_name: HashMap<String, usize>,
    pub(crate) by_plural: HashMap<String, usize>,
    /// Referenced entity name → entities pointing at it.
    pub dependents: HashMap<String, Vec<Dependent>>,
    /// Entity name → join-table rows keyed by its id.
    pub links: HashMap<String, Vec<LinkRows>>,
    /// Entity names ordered leaves first along cascade edges.
    pub delete_order: Vec<String>,
}

impl ResolvedModel {
    pub fn entity(&self, name: &str) -> Option<&ResolvedEntity> {
        self.by_name.get(name).map(|i| &self.entities[*i])
    }

    pub fn entity_by_plural(&self, plural: &str) -> Option<&ResolvedEntity> {
        self.by_plural.get(plural).map(|i| &self.entities[*i])
    }

    pub fn dependents_of(&self, name: &str) -> &[Dependent] {
        self.dependents.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn links_of(&self, name: &str) -> &[LinkRows] {
        self.links.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}
