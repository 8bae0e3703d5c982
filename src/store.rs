//! Persistence driver: a single-connection SQLite pool with foreign keys enforced, and the
//! `run`/`get`/`all` primitives every pipeline goes through.

use crate::error::AppError;
use crate::sql::{QueryBuf, SqliteBindValue};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;

/// A decoded row: column alias → JSON value.
pub type Row = Map<String, Value>;

/// Outcome of a write statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunResult {
    pub last_insert_id: i64,
    pub rows_affected: u64,
}

/// Connection settings. `DATABASE_URL` selects the database, default in-memory.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    pub database_url: String,
}

impl StoreOptions {
    pub fn from_env() -> Self {
        StoreOptions {
            database_url: std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".into()),
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            database_url: "sqlite::memory:".into(),
        }
    }
}

/// Open the store. Exactly one connection is kept so that an insert and the id read after it
/// can never interleave with another writer, and so an in-memory database survives.
pub async fn connect(options: &StoreOptions) -> Result<SqlitePool, AppError> {
    let connect = SqliteConnectOptions::from_str(&options.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect)
        .await?;
    tracing::info!(url = %options.database_url, "store connected");
    Ok(pool)
}

/// Execute a multi-statement script such as `sql/schema.sql`.
pub async fn apply_schema(pool: &SqlitePool, script: &str) -> Result<(), AppError> {
    sqlx::raw_sql(script).execute(pool).await?;
    Ok(())
}

/// Async `run/get/all` over one connection.
#[async_trait]
pub trait Driver: Send {
    async fn run(&mut self, q: &QueryBuf) -> Result<RunResult, AppError>;
    async fn get(&mut self, q: &QueryBuf) -> Result<Option<Row>, AppError>;
    async fn all(&mut self, q: &QueryBuf) -> Result<Vec<Row>, AppError>;
}

fn prepare(q: &QueryBuf) -> sqlx::query::Query<'_, Sqlite, SqliteArguments<'_>> {
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(SqliteBindValue::from_json(p));
    }
    query
}

#[async_trait]
impl Driver for SqliteConnection {
    async fn run(&mut self, q: &QueryBuf) -> Result<RunResult, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "run");
        let done = prepare(q).execute(&mut *self).await?;
        Ok(RunResult {
            last_insert_id: done.last_insert_rowid(),
            rows_affected: done.rows_affected(),
        })
    }

    async fn get(&mut self, q: &QueryBuf) -> Result<Option<Row>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "get");
        let row = prepare(q).fetch_optional(&mut *self).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }

    async fn all(&mut self, q: &QueryBuf) -> Result<Vec<Row>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "all");
        let rows = prepare(q).fetch_all(&mut *self).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &SqliteRow) -> Row {
    use sqlx::{Column, Row as _};
    let mut map = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), cell_to_value(row, i));
    }
    map
}

/// Decode by the value's runtime storage class; SQLite column types are only affinities.
fn cell_to_value(row: &SqliteRow, index: usize) -> Value {
    use sqlx::{Decode, Row as _, TypeInfo, ValueRef};
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }
    let storage = raw.type_info().name().to_string();
    match storage.as_str() {
        "INTEGER" | "BOOLEAN" => <i64 as Decode<Sqlite>>::decode(raw)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" | "NUMERIC" => <f64 as Decode<Sqlite>>::decode(raw)
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        _ => <String as Decode<Sqlite>>::decode(raw)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn run_reports_last_insert_id() {
        let pool = connect(&StoreOptions::default()).await.unwrap();
        apply_schema(&pool, "CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, score REAL);")
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let q = QueryBuf {
            sql: "INSERT INTO t (name, score) VALUES (?, ?)".into(),
            params: vec![json!("a"), json!(1.5)],
        };
        let first = conn.run(&q).await.unwrap();
        let second = conn.run(&q).await.unwrap();
        assert_eq!(first.last_insert_id, 1);
        assert_eq!(second.last_insert_id, 2);

        let row = conn
            .get(&QueryBuf {
                sql: "SELECT id, name, score, NULL AS nothing FROM t WHERE id = ?".into(),
                params: vec![json!(2)],
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["id"], json!(2));
        assert_eq!(row["name"], json!("a"));
        assert_eq!(row["score"], json!(1.5));
        assert_eq!(row["nothing"], Value::Null);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let pool = connect(&StoreOptions::default()).await.unwrap();
        apply_schema(
            &pool,
            "CREATE TABLE p (id INTEGER PRIMARY KEY); CREATE TABLE c (id INTEGER PRIMARY KEY, p INTEGER REFERENCES p(id));",
        )
        .await
        .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let err = conn
            .run(&QueryBuf {
                sql: "INSERT INTO c (p) VALUES (?)".into(),
                params: vec![json!(9)],
            })
            .await
            .unwrap_err();
        assert!(err.is_foreign_key_violation());
    }
}
