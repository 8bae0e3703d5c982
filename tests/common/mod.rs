#![allow(dead_code)]

use plantdb_sdk::{apply_schema, connect, default_config, resolve, AppError, CrudService, ResolvedModel, StoreOptions, SCHEMA};
use serde_json::Value;
use sqlx::SqlitePool;

pub struct Store {
    pub pool: SqlitePool,
    pub model: ResolvedModel,
}

/// Fresh in-memory database with the bundled schema.
pub async fn store() -> Store {
    let pool = connect(&StoreOptions::default()).await.unwrap();
    apply_schema(&pool, SCHEMA).await.unwrap();
    Store {
        pool,
        model: resolve(&default_config()).unwrap(),
    }
}

impl Store {
    pub async fn create(&self, entity: &str, options: Value) -> Result<Value, AppError> {
        let e = self.model.entity(entity).unwrap();
        CrudService::create(&self.pool, &self.model, e, Some(&options)).await
    }

    pub async fn find(&self, entity: &str, criteria: Value) -> Result<plantdb_sdk::FindResult, AppError> {
        let e = self.model.entity(entity).unwrap();
        CrudService::find(&self.pool, &self.model, e, Some(&criteria)).await
    }

    pub async fn update(&self, entity: &str, update: Value, criteria: Value) -> Result<Vec<i64>, AppError> {
        let e = self.model.entity(entity).unwrap();
        CrudService::update(&self.pool, &self.model, e, Some(&update), Some(&criteria)).await
    }

    pub async fn delete(
        &self,
        entity: &str,
        criteria: Value,
    ) -> Result<std::collections::BTreeMap<String, Vec<i64>>, AppError> {
        let e = self.model.entity(entity).unwrap();
        CrudService::delete(&self.pool, &self.model, e, Some(&criteria)).await
    }

    /// Ids in the primary bucket of a find, ascending.
    pub async fn ids(&self, entity: &str, criteria: Value) -> Vec<i64> {
        let plural = self.model.entity(entity).unwrap().plural.clone();
        let found = self.find(entity, criteria).await.unwrap();
        let mut ids: Vec<i64> = found.entities[&plural]
            .as_object()
            .unwrap()
            .keys()
            .map(|k| k.parse().unwrap())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Family 1 → Generation 1, then one plant per name. Each plant gets an implicit genotype.
    pub async fn family_with_plants(&self, names: &[&str]) {
        self.create("Generation", serde_json::json!({"generationName": "F1", "familyName": "Haze"}))
            .await
            .unwrap();
        for name in names {
            self.create(
                "Plant",
                serde_json::json!({"plantName": name, "generationId": 1}),
            )
            .await
            .unwrap();
        }
    }
}
