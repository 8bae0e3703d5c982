//! Request validation from the entity model: required, type and enum checks plus entity rules.

use crate::config::{AttributeConfig, AttributeType, EntityRule, ResolvedEntity};
use crate::error::AppError;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub struct RequestValidator;

impl RequestValidator {
    /// The argument has to be a plain associative object.
    pub fn object<'v>(value: Option<&'v Value>, message: &str) -> Result<&'v Map<String, Value>, AppError> {
        value
            .and_then(Value::as_object)
            .ok_or_else(|| AppError::Shape(message.to_string()))
    }

    /// Type and enum check for a non-null value.
    pub fn field(label: &str, attr: &AttributeConfig, value: &Value) -> Result<(), AppError> {
        if value.is_null() {
            return Ok(());
        }
        if !type_matches(attr.type_, value) {
            return Err(AppError::TypeMismatch(format!(
                "{}.{} has to be of type {}",
                label,
                attr.name,
                attr.type_.name()
            )));
        }
        if let Some(allowed) = &attr.allowed {
            let ok = value.as_str().map(|s| allowed.iter().any(|a| a == s)).unwrap_or(false);
            if !ok {
                return Err(AppError::EnumValue(format!(
                    "{}.{} has to be one of: {}",
                    label,
                    attr.name,
                    allowed.join(", ")
                )));
            }
        }
        Ok(())
    }

    pub fn required(label: &str, attr: &AttributeConfig, value: Option<&Value>) -> Result<(), AppError> {
        if attr.required && value.map(Value::is_null).unwrap_or(true) {
            return Err(AppError::RequiredField(format!("{}.{} has to be set", label, attr.name)));
        }
        Ok(())
    }

    /// Ids for a many-to-many attribute: null means the empty set, duplicates collapse.
    pub fn id_set(label: &str, name: &str, value: &Value) -> Result<BTreeSet<i64>, AppError> {
        let mismatch = || AppError::TypeMismatch(format!("{}.{} has to be an array of integers", label, name));
        match value {
            Value::Null => Ok(BTreeSet::new()),
            Value::Array(items) => items.iter().map(|v| v.as_i64().ok_or_else(mismatch)).collect(),
            _ => Err(mismatch()),
        }
    }

    /// Entity rules over the final attribute values of a row.
    pub fn rules(label: &str, entity: &ResolvedEntity, is_set: impl Fn(&str) -> bool) -> Result<(), AppError> {
        for rule in &entity.rules {
            match rule {
                EntityRule::ExactlyOneOf(names) => {
                    let set = names.iter().filter(|n| is_set(n)).count();
                    if set != 1 {
                        let names: Vec<String> = names.iter().map(|n| format!("{}.{}", label, n)).collect();
                        return Err(AppError::RequiredField(format!(
                            "exactly one of {} has to be set",
                            names.join(", ")
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn type_matches(type_: AttributeType, v: &Value) -> bool {
    match type_ {
        AttributeType::Integer => v.is_i64() || v.is_u64(),
        AttributeType::Float => v.is_number(),
        AttributeType::Text | AttributeType::Timestamp => v.is_string(),
        AttributeType::Boolean => v.is_boolean(),
        AttributeType::Json => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_config, resolve};
    use serde_json::json;

    #[test]
    fn required_and_types() {
        let model = resolve(&default_config()).unwrap();
        let plant = model.entity("Plant").unwrap();
        let name = plant.field("plantName").unwrap();
        assert!(matches!(
            RequestValidator::required("options", name, None),
            Err(AppError::RequiredField(m)) if m == "options.plantName has to be set"
        ));
        assert!(matches!(
            RequestValidator::field("options", name, &json!(3)),
            Err(AppError::TypeMismatch(_))
        ));
        let sex = plant.field("plantSex").unwrap();
        assert!(RequestValidator::field("options", sex, &json!("female")).is_ok());
        assert!(matches!(
            RequestValidator::field("options", sex, &json!("other")),
            Err(AppError::EnumValue(_))
        ));
    }

    #[test]
    fn id_sets_deduplicate() {
        let ids = RequestValidator::id_set("options", "generationParents", &json!([3, 1, 3])).unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert!(RequestValidator::id_set("options", "generationParents", &json!(["a"])).is_err());
    }

    #[test]
    fn journal_needs_exactly_one_target() {
        let model = resolve(&default_config()).unwrap();
        let journal = model.entity("Journal").unwrap();
        assert!(RequestValidator::rules("options", journal, |n| n == "plantId").is_ok());
        assert!(RequestValidator::rules("options", journal, |_| false).is_err());
        assert!(RequestValidator::rules("options", journal, |n| n != "environmentId").is_err());
    }
}
