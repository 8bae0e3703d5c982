//! Raw entity declarations. Serde-compatible so a model can be loaded from JSON as well as built in code.

use serde::{Deserialize, Serialize};

/// Storage and wire type of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Integer,
    Float,
    Text,
    Boolean,
    Json,
    Timestamp,
}

impl AttributeType {
    pub fn name(&self) -> &'static str {
        match self {
            AttributeType::Integer => "integer",
            AttributeType::Float => "number",
            AttributeType::Text => "string",
            AttributeType::Boolean => "boolean",
            AttributeType::Json => "json",
            AttributeType::Timestamp => "timestamp",
        }
    }
}

/// Value written at create when the client leaves an optional attribute unset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    #[default]
    Null,
    EmptyString,
}

/// What happens to referencing rows when the referenced row is deleted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    #[default]
    Cascade,
    SetNull,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Name of the referenced entity (e.g. "Generation").
    pub entity: String,
    #[serde(default)]
    pub on_delete: OnDelete,
    /// When the id is absent but fields of the referenced entity are present, create it first.
    #[serde(default)]
    pub cascade_create: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: AttributeType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: DefaultValue,
    /// Enum values; when set the attribute only accepts one of these strings.
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
    #[serde(default)]
    pub references: Option<ReferenceConfig>,
}

/// Many-to-many relation stored in a join table, e.g. generation parents.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManyToManyConfig {
    pub name: String,
    pub join_table: String,
    /// Join-table column holding our id.
    pub our_key: String,
    /// Join-table column holding the related id.
    pub their_key: String,
    pub entity: String,
}

/// One-to-many relation exposed as an aggregated id list, e.g. `familyGenerations`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OneToManyConfig {
    pub name: String,
    pub entity: String,
}

/// Entity-specific validation beyond per-attribute rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "attributes")]
pub enum EntityRule {
    /// Exactly one of the listed attributes must be non-null.
    ExactlyOneOf(Vec<String>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub plural: String,
    pub table: String,
    pub id: String,
    pub created_at: String,
    pub modified_at: String,
    pub attributes: Vec<AttributeConfig>,
    #[serde(default)]
    pub many_to_many: Vec<ManyToManyConfig>,
    #[serde(default)]
    pub one_to_many: Vec<OneToManyConfig>,
    /// Entities LEFT JOINed by find and id resolution, in join order.
    #[serde(default)]
    pub joins: Vec<String>,
    #[serde(default)]
    pub rules: Vec<EntityRule>,
}

/// The whole entity model.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    pub entities: Vec<EntityConfig>,
}
