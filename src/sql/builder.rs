//! Fluent SQL builder: identifiers come from the resolved model only, values are always parameters.

use serde_json::Value;

/// Quote identifier for SQLite (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `"table"."column"`.
pub fn qualified(table: &str, column: &str) -> String {
    format!("{}.{}", quoted(table), quoted(column))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[derive(Clone, Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

/// WHERE predicate tree. Fragments carry their own `?` placeholders and values in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Fragment { sql: String, params: Vec<Value> },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn fragment(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Predicate::Fragment { sql: sql.into(), params }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Predicate::Fragment { sql: sql.into(), params: Vec::new() }
    }

    pub fn not(p: Predicate) -> Self {
        Predicate::Not(Box::new(p))
    }

    /// `expr IN (?, ...)`; never matches for an empty list.
    pub fn is_in(expr: &str, values: Vec<Value>) -> Self {
        if values.is_empty() {
            return Predicate::Or(Vec::new());
        }
        Predicate::Fragment {
            sql: format!("{} IN ({})", expr, placeholders(values.len())),
            params: values,
        }
    }

    pub fn id_in(table: &str, id: &str, ids: &[i64]) -> Self {
        Self::is_in(&qualified(table, id), ids.iter().map(|i| Value::from(*i)).collect())
    }

    /// Render into SQL, appending bound values to `params` in placeholder order.
    pub fn render(&self, params: &mut Vec<Value>) -> String {
        match self {
            Predicate::Fragment { sql, params: p } => {
                params.extend(p.iter().cloned());
                sql.clone()
            }
            Predicate::And(parts) => Self::render_joined(parts, " AND ", "1 = 1", params),
            Predicate::Or(parts) => Self::render_joined(parts, " OR ", "0 = 1", params),
            Predicate::Not(p) => format!("NOT ({})", p.render(params)),
        }
    }

    fn render_joined(parts: &[Predicate], sep: &str, empty: &str, params: &mut Vec<Value>) -> String {
        match parts {
            [] => empty.to_string(),
            [single] => single.render(params),
            _ => {
                let rendered: Vec<String> = parts.iter().map(|p| p.render(params)).collect();
                format!("({})", rendered.join(sep))
            }
        }
    }
}

fn where_clause(wheres: &[Predicate], params: &mut Vec<Value>) -> String {
    if wheres.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = wheres.iter().map(|p| p.render(params)).collect();
    format!(" WHERE {}", rendered.join(" AND "))
}

/// SELECT builder. Cloning before projection/limit yields the base for a COUNT query.
#[derive(Clone, Debug, Default)]
pub struct Select {
    distinct: bool,
    fields: Vec<String>,
    from: String,
    joins: Vec<String>,
    wheres: Vec<Predicate>,
    groups: Vec<String>,
    orders: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    pub fn from(table: &str) -> Self {
        Select {
            from: quoted(table),
            ..Default::default()
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn field(mut self, expr: impl Into<String>) -> Self {
        self.fields.push(expr.into());
        self
    }

    pub fn field_as(mut self, expr: impl AsRef<str>, alias: &str) -> Self {
        self.fields.push(format!("{} AS {}", expr.as_ref(), quoted(alias)));
        self
    }

    /// `LEFT JOIN "table" ON "table"."column" = "left_table"."left_column"`.
    pub fn left_join(mut self, table: &str, column: &str, left_table: &str, left_column: &str) -> Self {
        self.joins.push(format!(
            " LEFT JOIN {} ON {} = {}",
            quoted(table),
            qualified(table, column),
            qualified(left_table, left_column)
        ));
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.wheres.push(predicate);
        self
    }

    pub fn group(mut self, expr: impl Into<String>) -> Self {
        self.groups.push(expr.into());
        self
    }

    pub fn order(mut self, expr: impl Into<String>) -> Self {
        self.orders.push(expr.into());
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn build(&self) -> QueryBuf {
        let mut params = Vec::new();
        let fields = if self.fields.is_empty() {
            "*".to_string()
        } else {
            self.fields.join(", ")
        };
        let mut sql = format!(
            "SELECT {}{} FROM {}{}",
            if self.distinct { "DISTINCT " } else { "" },
            fields,
            self.from,
            self.joins.concat()
        );
        sql.push_str(&where_clause(&self.wheres, &mut params));
        if !self.groups.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.groups.join(", ")));
        }
        if !self.orders.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.orders.join(", ")));
        }
        match (self.limit, self.offset) {
            (Some(l), Some(o)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", l, o)),
            (Some(l), None) => sql.push_str(&format!(" LIMIT {}", l)),
            // SQLite only accepts OFFSET after a LIMIT.
            (None, Some(o)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", o)),
            (None, None) => {}
        }
        QueryBuf { sql, params }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Insert {
    table: String,
    sets: Vec<(String, Value)>,
}

impl Insert {
    pub fn table(table: &str) -> Self {
        Insert {
            table: table.to_string(),
            sets: Vec::new(),
        }
    }

    pub fn set(mut self, column: &str, value: Value) -> Self {
        self.sets.push((column.to_string(), value));
        self
    }

    pub fn build(&self) -> QueryBuf {
        if self.sets.is_empty() {
            return QueryBuf {
                sql: format!("INSERT INTO {} DEFAULT VALUES", quoted(&self.table)),
                params: Vec::new(),
            };
        }
        let cols: Vec<String> = self.sets.iter().map(|(c, _)| quoted(c)).collect();
        QueryBuf {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quoted(&self.table),
                cols.join(", "),
                placeholders(cols.len())
            ),
            params: self.sets.iter().map(|(_, v)| v.clone()).collect(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Update {
    table: String,
    sets: Vec<(String, Value)>,
    wheres: Vec<Predicate>,
}

impl Update {
    pub fn table(table: &str) -> Self {
        Update {
            table: table.to_string(),
            ..Default::default()
        }
    }

    pub fn set(mut self, column: &str, value: Value) -> Self {
        self.sets.push((column.to_string(), value));
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.wheres.push(predicate);
        self
    }

    pub fn build(&self) -> QueryBuf {
        let mut params: Vec<Value> = self.sets.iter().map(|(_, v)| v.clone()).collect();
        let sets: Vec<String> = self.sets.iter().map(|(c, _)| format!("{} = ?", quoted(c))).collect();
        let mut sql = format!("UPDATE {} SET {}", quoted(&self.table), sets.join(", "));
        sql.push_str(&where_clause(&self.wheres, &mut params));
        QueryBuf { sql, params }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Delete {
    table: String,
    wheres: Vec<Predicate>,
}

impl Delete {
    pub fn from(table: &str) -> Self {
        Delete {
            table: table.to_string(),
            wheres: Vec::new(),
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.wheres.push(predicate);
        self
    }

    pub fn build(&self) -> QueryBuf {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", quoted(&self.table));
        sql.push_str(&where_clause(&self.wheres, &mut params));
        QueryBuf { sql, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_renders_clauses_in_order() {
        let q = Select::from("plants")
            .field(qualified("plants", "plantId"))
            .left_join("genotypes", "genotypeId", "plants", "genotypeId")
            .filter(Predicate::fragment("\"plants\".\"plantName\" = ?", vec![json!("a")]))
            .group(qualified("plants", "plantId"))
            .order("\"plants\".\"plantId\" ASC")
            .limit(10)
            .offset(5)
            .build();
        assert_eq!(
            q.sql,
            "SELECT \"plants\".\"plantId\" FROM \"plants\" LEFT JOIN \"genotypes\" ON \"genotypes\".\"genotypeId\" = \"plants\".\"genotypeId\" WHERE \"plants\".\"plantName\" = ? GROUP BY \"plants\".\"plantId\" ORDER BY \"plants\".\"plantId\" ASC LIMIT 10 OFFSET 5"
        );
        assert_eq!(q.params, vec![json!("a")]);
    }

    #[test]
    fn offset_without_limit_uses_unbounded_limit() {
        let q = Select::from("families").offset(3).build();
        assert_eq!(q.sql, "SELECT * FROM \"families\" LIMIT -1 OFFSET 3");
    }

    #[test]
    fn predicate_tree_keeps_param_order() {
        let p = Predicate::Or(vec![
            Predicate::And(vec![
                Predicate::fragment("a = ?", vec![json!(1)]),
                Predicate::fragment("b = ?", vec![json!(2)]),
            ]),
            Predicate::not(Predicate::fragment("c = ?", vec![json!(3)])),
        ]);
        let mut params = Vec::new();
        assert_eq!(p.render(&mut params), "((a = ? AND b = ?) OR NOT (c = ?))");
        assert_eq!(params, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn empty_in_list_never_matches() {
        let mut params = Vec::new();
        assert_eq!(Predicate::id_in("plants", "plantId", &[]).render(&mut params), "0 = 1");
        assert!(params.is_empty());
    }

    #[test]
    fn update_binds_sets_before_where() {
        let q = Update::table("families")
            .set("familyName", json!("x"))
            .filter(Predicate::id_in("families", "familyId", &[1, 2]))
            .build();
        assert_eq!(
            q.sql,
            "UPDATE \"families\" SET \"familyName\" = ? WHERE \"families\".\"familyId\" IN (?, ?)"
        );
        assert_eq!(q.params, vec![json!("x"), json!(1), json!(2)]);
    }

    #[test]
    fn insert_without_values_uses_defaults() {
        assert_eq!(Insert::table("families").build().sql, "INSERT INTO \"families\" DEFAULT VALUES");
    }
}
