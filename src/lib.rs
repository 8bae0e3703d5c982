//! PlantDB SDK: configuration-driven CRUD pipelines over SQLite with criteria filtering and
//! cascading create/delete across the entity graph.

pub mod config;
pub mod criteria;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{default_config, load_from_path, resolve, FullConfig, ResolvedEntity, ResolvedModel};
pub use criteria::{Criteria, FilterEngine, JsonPath};
pub use error::{AppError, ConfigError};
pub use routes::{app, entity_routes, status_routes};
pub use service::{CrudService, FindResult};
pub use state::AppState;
pub use store::{apply_schema, connect, StoreOptions};

/// Reference DDL for the built-in entity model.
pub const SCHEMA: &str = include_str!("../sql/schema.sql");
