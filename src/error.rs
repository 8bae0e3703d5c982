//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("no join path from {entity} to {target}")]
    UnreachableJoin { entity: String, target: String },
    #[error("cascade cycle through {0}")]
    CascadeCycle(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Every public operation fails with one of these. Messages are meant for the caller as-is.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Argument is missing or not an associative object where one is required.
    #[error("{0}")]
    Shape(String),
    #[error("{0}")]
    RequiredField(String),
    #[error("{0}")]
    TypeMismatch(String),
    #[error("{0}")]
    EnumValue(String),
    /// Foreign-key violation translated into a field-named message.
    #[error("{0}")]
    ReferentialIntegrity(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Anything else the store reports, passed through verbatim.
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl AppError {
    /// True when the store rejected a statement because of a foreign-key constraint.
    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            AppError::Db(sqlx::Error::Database(e)) => {
                matches!(e.kind(), sqlx::error::ErrorKind::ForeignKeyViolation)
                    || e.message().contains("FOREIGN KEY constraint failed")
            }
            _ => false,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Shape(_) => (StatusCode::UNPROCESSABLE_ENTITY, "shape_error"),
            AppError::RequiredField(_) => (StatusCode::UNPROCESSABLE_ENTITY, "required_field"),
            AppError::TypeMismatch(_) => (StatusCode::UNPROCESSABLE_ENTITY, "type_mismatch"),
            AppError::EnumValue(_) => (StatusCode::UNPROCESSABLE_ENTITY, "enum_value"),
            AppError::ReferentialIntegrity(_) => (StatusCode::CONFLICT, "referential_integrity"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
