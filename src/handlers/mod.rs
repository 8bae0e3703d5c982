//! HTTP handlers for the entity pipelines.

pub mod entity;
pub use entity::*;
