//! Typed errors and HTTP mapping.

use crate::hooks::ResourceHook;
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
    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },
    #[error("invalid inverse: {resource}.{relationship} -> {inverse}")]
    InvalidInverse {
        resource: String,
        relationship: String,
        inverse: String,
    },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Failures raised while running resource hooks.
#[derive(Error, Debug)]
pub enum HookError {
    /// A hook vetoed the operation. Aborts the rest of the pass.
    #[error("{hook} on '{resource_type}' rejected the operation: {message}")]
    Rejected {
        resource_type: String,
        hook: ResourceHook,
        message: String,
    },
    /// Programming error: a relationship or type lookup that the graph cannot satisfy.
    #[error("graph consistency: {0}")]
    GraphConsistency(String),
    /// A collaborator the pass needs was not supplied.
    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),
    #[error("repository: {0}")]
    Repository(String),
}

impl HookError {
    pub fn rejected(resource_type: &str, hook: ResourceHook, message: impl Into<String>) -> Self {
        HookError::Rejected {
            resource_type: resource_type.to_string(),
            hook,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldError {
    pub resource_type: String,
    pub field: String,
    pub message: String,
}

/// One or more field-level validation failures (422).
#[derive(Error, Debug, Default)]
#[error("validation failed: {}", summary(.errors))]
pub struct ValidationFailure {
    pub errors: Vec<FieldError>,
}

fn summary(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}.{} {}", e.resource_type, e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationFailure {
    pub fn single(resource_type: &str, field: &str, message: impl Into<String>) -> Self {
        ValidationFailure {
            errors: vec![FieldError {
                resource_type: resource_type.to_string(),
                field: field.to_string(),
                message: message.into(),
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
}

impl From<AppError> for HookError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Hook(h) => h,
            other => HookError::Repository(other.to_string()),
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Hook(HookError::Rejected { .. }) => (StatusCode::FORBIDDEN, "hook_rejected"),
            AppError::Hook(HookError::Repository(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::Hook(_) => (StatusCode::INTERNAL_SERVER_ERROR, "hook_error"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::UnsupportedMediaType(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type"),
        };
        let details = match &self {
            AppError::Validation(v) => serde_json::to_value(&v.errors).ok(),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
