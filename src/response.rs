//! Standard response envelope helpers.

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaCount>,
}

#[derive(Serialize)]
pub struct MetaCount {
    pub count: u64,
}

pub fn success_created<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::CREATED, Json(SuccessOne { data, meta: None }))
}

pub fn success_ok<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::OK, Json(SuccessOne { data, meta: None }))
}

/// `{data: [...], meta: {count}}`.
pub fn success_counted<T: Serialize>(data: Vec<T>) -> (StatusCode, Json<SuccessOne<Vec<T>>>) {
    let count = data.len() as u64;
    (
        StatusCode::OK,
        Json(SuccessOne {
            data,
            meta: Some(MetaCount { count }),
        }),
    )
}
