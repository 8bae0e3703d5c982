//! Criteria → predicate tree. Attribute names resolve through the entity's static attribute map;
//! anything unknown is dropped before it can reach SQL.

use crate::config::{AttributeInfo, AttributeRole, AttributeType, ResolvedEntity};
use crate::criteria::{JsonPath, Sort};
use crate::sql::{qualified, quoted, Predicate};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub struct FilterEngine<'a> {
    entity: &'a ResolvedEntity,
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

/// `$or` accepts one alternative or an array of them.
fn alternatives(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// AND of the plain parts, OR-ed with every `$or` alternative.
fn combine(and: Vec<Predicate>, ors: Vec<Predicate>) -> Option<Predicate> {
    match (and.is_empty(), ors.is_empty()) {
        (true, true) => None,
        (false, true) => Some(Predicate::And(and)),
        (true, false) => Some(Predicate::Or(ors)),
        (false, false) => {
            let mut all = vec![Predicate::And(and)];
            all.extend(ors);
            Some(Predicate::Or(all))
        }
    }
}

/// Negation that treats an unknown (NULL) outcome as "does not match".
fn not_matching(p: Predicate) -> Predicate {
    let mut params = Vec::new();
    let sql = p.render(&mut params);
    Predicate::fragment(format!("NOT COALESCE({}, 0)", sql), params)
}

fn id_set(value: &Value) -> Option<BTreeSet<i64>> {
    match value {
        Value::Null => Some(BTreeSet::new()),
        Value::Number(n) => n.as_i64().map(|i| [i].into_iter().collect()),
        Value::Array(items) => items.iter().map(Value::as_i64).collect(),
        _ => None,
    }
}

fn id_params(ids: &BTreeSet<i64>) -> (String, Vec<Value>) {
    let marks = vec!["?"; ids.len()].join(", ");
    (marks, ids.iter().map(|i| Value::from(*i)).collect())
}

impl<'a> FilterEngine<'a> {
    pub fn new(entity: &'a ResolvedEntity) -> Self {
        FilterEngine { entity }
    }

    /// Predicate for a `where` object; None when nothing in it is recognised.
    pub fn predicate(&self, filter: &Map<String, Value>) -> Option<Predicate> {
        let mut and = Vec::new();
        let mut ors = Vec::new();
        for (key, value) in filter {
            if key == "$or" {
                for alt in alternatives(value) {
                    if let Some(p) = alt.as_object().and_then(|m| self.predicate(m)) {
                        ors.push(p);
                    }
                }
                continue;
            }
            if let Some(p) = self.attribute(key, value) {
                and.push(p);
            }
        }
        combine(and, ors)
    }

    /// ORDER BY expression for a sort clause on a plain column; None falls back to the default order.
    pub fn order_by(&self, sort: &Sort) -> Option<String> {
        let info = self.entity.attribute(&sort.attribute)?;
        let column = info.column()?;
        Some(format!(
            "{} {}",
            qualified(&info.table, column),
            if sort.descending { "DESC" } else { "ASC" }
        ))
    }

    fn attribute(&self, key: &str, value: &Value) -> Option<Predicate> {
        let (base, path) = match key.split_once('.') {
            Some((base, rest)) => (base, Some(rest)),
            None => (key, None),
        };
        let Some(info) = self.entity.attribute(base) else {
            tracing::warn!(entity = %self.entity.name, attribute = %key, "ignoring unknown criteria attribute");
            return None;
        };
        match (&info.role, info.type_, path) {
            (AttributeRole::ManyToMany { .. }, _, None) => self.relation_set(info, value),
            (AttributeRole::OneToMany { .. }, _, _) => None,
            (_, AttributeType::Json, None) => self.json(info, &JsonPath::root(), value),
            (_, AttributeType::Json, Some(rest)) => {
                let path = JsonPath::parse(rest)?;
                self.json(info, &path, value)
            }
            (_, _, None) => self.column(info, value),
            (_, _, Some(_)) => None,
        }
    }

    fn column(&self, info: &AttributeInfo, value: &Value) -> Option<Predicate> {
        let col = qualified(&info.table, info.column()?);
        match value {
            Value::Object(ops) if is_operator_object(ops) => {
                let mut and = Vec::new();
                let mut ors = Vec::new();
                for (op, arg) in ops {
                    let p = match op.as_str() {
                        "$eq" => column_eq(&col, arg),
                        "$neq" => column_neq(&col, arg),
                        "$in" => match arg {
                            Value::Array(items) => Some(Predicate::is_in(&col, items.clone())),
                            other => column_eq(&col, other),
                        },
                        "$like" => arg
                            .as_str()
                            .map(|s| Predicate::fragment(format!("{} LIKE ?", col), vec![Value::from(s)])),
                        "$or" => {
                            ors.extend(alternatives(arg).into_iter().filter_map(|alt| self.column(info, alt)));
                            None
                        }
                        _ => {
                            tracing::debug!(attribute = %info.name, op = %op, "operator not supported on column");
                            None
                        }
                    };
                    and.extend(p);
                }
                combine(and, ors)
            }
            Value::Object(_) => None,
            other => column_eq(&col, other),
        }
    }

    /// Set semantics on a many-to-many attribute such as `generationParents`.
    fn relation_set(&self, info: &AttributeInfo, value: &Value) -> Option<Predicate> {
        let AttributeRole::ManyToMany { join_table, our_key, their_key } = &info.role else {
            return None;
        };
        let set = RelationSet {
            owner: qualified(&info.table, &info.table_id),
            join_table: quoted(join_table),
            our_key: quoted(our_key),
            their_key: quoted(their_key),
        };
        match value {
            Value::Object(ops) if is_operator_object(ops) => {
                let mut and = Vec::new();
                let mut ors = Vec::new();
                for (op, arg) in ops {
                    let p = match op.as_str() {
                        "$eq" => id_set(arg).map(|ids| set.exact(&ids)),
                        "$neq" => id_set(arg).map(|ids| Predicate::not(set.exact(&ids))),
                        "$has" => id_set(arg).map(|ids| set.contains_all(&ids)),
                        "$nhas" => id_set(arg).map(|ids| Predicate::not(set.contains_all(&ids))),
                        "$in" => id_set(arg).map(|ids| set.contains_any(&ids)),
                        "$or" => {
                            ors.extend(alternatives(arg).into_iter().filter_map(|alt| self.relation_set(info, alt)));
                            None
                        }
                        _ => None,
                    };
                    and.extend(p);
                }
                combine(and, ors)
            }
            other => id_set(other).map(|ids| set.exact(&ids)),
        }
    }

    fn json(&self, info: &AttributeInfo, path: &JsonPath, value: &Value) -> Option<Predicate> {
        let col = qualified(&info.table, info.column()?);
        match value {
            Value::Object(ops) if is_operator_object(ops) => {
                let mut and = Vec::new();
                let mut ors = Vec::new();
                for (op, arg) in ops {
                    let p = match op.as_str() {
                        "$eq" => Some(json_eq(&col, path, arg)),
                        "$neq" => Some(not_matching(json_eq(&col, path, arg))),
                        "$in" => match arg {
                            Value::Array(items) => Some(Predicate::Or(items.iter().map(|v| json_eq(&col, path, v)).collect())),
                            other => Some(json_eq(&col, path, other)),
                        },
                        "$has" => json_has(&col, path, arg),
                        "$nhas" => json_has(&col, path, arg).map(Predicate::not),
                        "$like" => arg.as_str().map(|s| {
                            Predicate::fragment(
                                format!("json_extract({}, ?) LIKE ?", col),
                                vec![Value::from(path.to_string()), Value::from(s)],
                            )
                        }),
                        "$or" => {
                            ors.extend(alternatives(arg).into_iter().filter_map(|alt| self.json(info, path, alt)));
                            None
                        }
                        _ => None,
                    };
                    and.extend(p);
                }
                combine(and, ors)
            }
            other => Some(json_eq(&col, path, other)),
        }
    }
}

fn column_eq(col: &str, value: &Value) -> Option<Predicate> {
    match value {
        Value::Null => Some(Predicate::raw(format!("{} IS NULL", col))),
        Value::Array(items) => Some(Predicate::is_in(col, items.clone())),
        Value::Object(_) => None,
        scalar => Some(Predicate::fragment(format!("{} = ?", col), vec![scalar.clone()])),
    }
}

fn column_neq(col: &str, value: &Value) -> Option<Predicate> {
    match value {
        Value::Null => Some(Predicate::raw(format!("{} IS NOT NULL", col))),
        Value::Array(items) if items.is_empty() => Some(Predicate::raw("1 = 1")),
        Value::Array(items) => Some(Predicate::fragment(
            format!("({} IS NULL OR {} NOT IN ({}))", col, col, vec!["?"; items.len()].join(", ")),
            items.clone(),
        )),
        Value::Object(_) => None,
        scalar => Some(Predicate::fragment(format!("{} IS NOT ?", col), vec![scalar.clone()])),
    }
}

/// Strictly typed equality against the decoded JSON value at `path`.
fn json_eq(col: &str, path: &JsonPath, value: &Value) -> Predicate {
    let p = Value::from(path.to_string());
    let typed = |types: &str| format!("json_type({}, ?) IN ({})", col, types);
    match value {
        Value::Null => Predicate::fragment(typed("'null'"), vec![p]),
        Value::Bool(true) => Predicate::fragment(typed("'true'"), vec![p]),
        Value::Bool(false) => Predicate::fragment(typed("'false'"), vec![p]),
        Value::Number(_) => Predicate::fragment(
            format!("({} AND json_extract({}, ?) = ?)", typed("'integer', 'real'"), col),
            vec![p.clone(), p, value.clone()],
        ),
        Value::String(_) => Predicate::fragment(
            format!("({} AND json_extract({}, ?) = ?)", typed("'text'"), col),
            vec![p.clone(), p, value.clone()],
        ),
        Value::Array(_) | Value::Object(_) => {
            let kind = if value.is_array() { "'array'" } else { "'object'" };
            Predicate::fragment(
                format!("({} AND json_extract({}, ?) = json(?))", typed(kind), col),
                vec![p.clone(), p, Value::from(value.to_string())],
            )
        }
    }
}

/// Key presence below `path`; an array of keys requires all of them.
/// String keys test object key presence; numbers test array positions.
fn json_has(col: &str, path: &JsonPath, keys: &Value) -> Option<Predicate> {
    let present = |key: &Value| {
        let target = match key {
            Value::String(k) => path.key(k),
            Value::Number(n) if n.is_u64() => path.child(&n.to_string()),
            _ => return None,
        };
        Some(Predicate::fragment(
            format!("json_type({}, ?) IS NOT NULL", col),
            vec![Value::from(target.to_string())],
        ))
    };
    match keys {
        Value::Array(items) => items
            .iter()
            .map(present)
            .collect::<Option<Vec<_>>>()
            .map(Predicate::And),
        k => present(k),
    }
}

struct RelationSet {
    owner: String,
    join_table: String,
    our_key: String,
    their_key: String,
}

impl RelationSet {
    /// The stored set equals `ids` exactly.
    fn exact(&self, ids: &BTreeSet<i64>) -> Predicate {
        if ids.is_empty() {
            return Predicate::raw(format!(
                "{} NOT IN (SELECT {} FROM {})",
                self.owner, self.our_key, self.join_table
            ));
        }
        let (marks, mut params) = id_params(ids);
        let n = Value::from(ids.len() as i64);
        params.insert(0, n.clone());
        params.push(n);
        Predicate::fragment(
            format!(
                "{owner} IN (SELECT {ok} FROM {jt} GROUP BY {ok} HAVING COUNT(DISTINCT {tk}) = ? AND SUM(CASE WHEN {tk} IN ({marks}) THEN 1 ELSE 0 END) = ?)",
                owner = self.owner,
                ok = self.our_key,
                jt = self.join_table,
                tk = self.their_key,
                marks = marks
            ),
            params,
        )
    }

    /// The stored set is a superset of `ids`.
    fn contains_all(&self, ids: &BTreeSet<i64>) -> Predicate {
        if ids.is_empty() {
            return Predicate::raw("1 = 1");
        }
        let (marks, mut params) = id_params(ids);
        params.push(Value::from(ids.len() as i64));
        Predicate::fragment(
            format!(
                "{owner} IN (SELECT {ok} FROM {jt} WHERE {tk} IN ({marks}) GROUP BY {ok} HAVING COUNT(DISTINCT {tk}) = ?)",
                owner = self.owner,
                ok = self.our_key,
                jt = self.join_table,
                tk = self.their_key,
                marks = marks
            ),
            params,
        )
    }

    /// The stored set shares at least one member with `ids`.
    fn contains_any(&self, ids: &BTreeSet<i64>) -> Predicate {
        let (marks, params) = id_params(ids);
        if ids.is_empty() {
            return Predicate::Or(Vec::new());
        }
        Predicate::fragment(
            format!(
                "{} IN (SELECT {} FROM {} WHERE {} IN ({}))",
                self.owner, self.our_key, self.join_table, self.their_key, marks
            ),
            params,
        )
    }
}
