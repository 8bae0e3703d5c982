//! Criteria objects (`{attributes?, where|filter?, sort?, limit?, offset?}`) and their
//! translation into WHERE predicates.

mod filter;
mod json_path;

pub use filter::FilterEngine;
pub use json_path::{JsonPath, Segment};

use crate::error::AppError;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Page size used by find when the criteria carries no limit.
pub const DEFAULT_LIMIT: u64 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    pub attribute: String,
    pub descending: bool,
}

impl Sort {
    /// `"<attribute> ASC|DESC"`, direction optional and case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)(?:\s+(?i:(ASC|DESC)))?\s*$").expect("static regex")
        });
        let caps = re.captures(s)?;
        Some(Sort {
            attribute: caps[1].to_string(),
            descending: caps
                .get(2)
                .map(|d| d.as_str().eq_ignore_ascii_case("desc"))
                .unwrap_or(false),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Criteria {
    pub attributes: Option<Vec<String>>,
    pub filter: Map<String, Value>,
    pub sort: Option<Sort>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Criteria {
    /// Validate the shape of a criteria object. `where` wins over its alias `filter`.
    pub fn from_value(value: &Value) -> Result<Self, AppError> {
        let obj = value
            .as_object()
            .ok_or_else(|| AppError::Shape("Criteria Object has to be an associative array".into()))?;

        let attributes = match obj.get("attributes") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| AppError::Shape("criteria.attributes has to be an array of strings".into()))?,
            ),
            Some(_) => return Err(AppError::Shape("criteria.attributes has to be an array of strings".into())),
        };

        let filter = match obj.get("where").or_else(|| obj.get("filter")) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(m)) => m.clone(),
            Some(_) => return Err(AppError::Shape("criteria.where has to be an associative array".into())),
        };

        let sort = match obj.get("sort") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(Sort::parse(s).ok_or_else(|| {
                AppError::Shape("criteria.sort has to be of the form '<attribute> ASC|DESC'".into())
            })?),
            Some(_) => return Err(AppError::Shape("criteria.sort has to be a string".into())),
        };

        Ok(Criteria {
            attributes,
            filter,
            sort,
            limit: non_negative(obj, "limit")?,
            offset: non_negative(obj, "offset")?,
        })
    }
}

fn non_negative(obj: &Map<String, Value>, key: &str) -> Result<Option<u64>, AppError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| AppError::Shape(format!("criteria.{} has to be a non-negative integer", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_criteria() {
        let c = Criteria::from_value(&json!({
            "attributes": ["plantName"],
            "filter": {"plantName": "a"},
            "sort": "plantName desc",
            "limit": 5,
            "offset": 2
        }))
        .unwrap();
        assert_eq!(c.attributes, Some(vec!["plantName".to_string()]));
        assert_eq!(c.filter.get("plantName"), Some(&json!("a")));
        assert_eq!(
            c.sort,
            Some(Sort {
                attribute: "plantName".into(),
                descending: true
            })
        );
        assert_eq!((c.limit, c.offset), (Some(5), Some(2)));
    }

    #[test]
    fn where_takes_precedence_over_filter() {
        let c = Criteria::from_value(&json!({"where": {"a": 1}, "filter": {"b": 2}})).unwrap();
        assert!(c.filter.contains_key("a"));
        assert!(!c.filter.contains_key("b"));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(matches!(Criteria::from_value(&json!([1])), Err(AppError::Shape(_))));
        assert!(matches!(Criteria::from_value(&json!({"limit": -1})), Err(AppError::Shape(_))));
        assert!(matches!(Criteria::from_value(&json!({"where": "x"})), Err(AppError::Shape(_))));
        assert!(matches!(Criteria::from_value(&json!({"sort": "a; DROP"})), Err(AppError::Shape(_))));
        assert!(matches!(Criteria::from_value(&json!({"attributes": [1]})), Err(AppError::Shape(_))));
    }

    #[test]
    fn sort_direction_defaults_to_ascending() {
        assert_eq!(Sort::parse("familyId").unwrap().descending, false);
        assert!(Sort::parse("familyId sideways").is_none());
    }
}
