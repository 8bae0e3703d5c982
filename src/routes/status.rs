//! Service status: liveness, store readiness per entity table, and the served entity set.

use crate::sql::{QueryBuf, Select};
use crate::state::AppState;
use crate::store::Driver;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
}

/// `tables` maps each plural to `ok` or the store error that probing it produced.
#[derive(Serialize)]
struct Readiness {
    status: &'static str,
    database: &'static str,
    tables: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct Served {
    name: &'static str,
    version: &'static str,
    entities: Vec<String>,
}

async fn health() -> Json<Liveness> {
    Json(Liveness { status: "ok" })
}

fn probe(table: &str) -> QueryBuf {
    Select::from(table).field("1 AS present").limit(1).build()
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let mut conn = match state.pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(error = %e, "store unavailable");
            let body = Readiness {
                status: "degraded",
                database: "unavailable",
                tables: BTreeMap::new(),
            };
            return (StatusCode::SERVICE_UNAVAILABLE, Json(body));
        }
    };
    let mut tables = BTreeMap::new();
    for entity in &state.model.entities {
        let outcome = match conn.get(&probe(&entity.table)).await {
            Ok(_) => "ok".to_string(),
            Err(e) => {
                tracing::warn!(table = %entity.table, error = %e, "table probe failed");
                e.to_string()
            }
        };
        tables.insert(entity.plural.clone(), outcome);
    }
    let healthy = tables.values().all(|v| v == "ok");
    let body = Readiness {
        status: if healthy { "ok" } else { "degraded" },
        database: "ok",
        tables,
    };
    let code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(body))
}

async fn version(State(state): State<AppState>) -> Json<Served> {
    Json(Served {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        entities: state.model.entities.iter().map(|e| e.plural.clone()).collect(),
    })
}

/// GET /health, GET /ready, GET /version.
pub fn status_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}
