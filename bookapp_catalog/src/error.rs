use std::collections::BTreeMap;

use actix_web::http::StatusCode;
use actix_web::{error, HttpRequest, HttpResponse, ResponseError};
use serde_json::json;
use validator::ValidationErrors;

use crate::image_store::ImageStoreError;
use crate::repository::RepositoryError;

/// Errors returned by services and handlers, each kind maps to one http status
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    BadRequest(String),

    /// Field name (camelCase) to message
    #[error("Validation failed for {0:?}")]
    InvalidFields(BTreeMap<String, String>),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error(transparent)]
    Storage(ImageStoreError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_field(field: &str, message: &str) -> Self {
        Self::InvalidFields(BTreeMap::from([(field.to_string(), message.to_string())]))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) | ApiError::InvalidFields(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Unauthorized(_) | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Storage(ImageStoreError::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            ApiError::Storage(ImageStoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) | ApiError::Repository(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            ApiError::InvalidFields(fields) => HttpResponse::build(status).json(fields),
            ApiError::Repository(RepositoryError::Conflict(message)) => {
                HttpResponse::build(status).json(error_body(message))
            }
            ApiError::Repository(err) => {
                tracing::error!("Repository failure {}", err);
                HttpResponse::build(status).json(error_body("Unexpected error"))
            }
            ApiError::Storage(ImageStoreError::Io { .. }) | ApiError::Internal(_) => {
                tracing::error!("Internal failure {}", self);
                HttpResponse::build(status).json(error_body("Unexpected error"))
            }
            other => HttpResponse::build(status).json(error_body(&other.to_string())),
        }
    }
}

fn error_body(message: &str) -> serde_json::Value {
    json!({"status": "error", "message": message})
}

impl From<ImageStoreError> for ApiError {
    fn from(err: ImageStoreError) -> Self {
        ApiError::Storage(err)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, field_errors)| {
                let message = field_errors
                    .iter()
                    .find_map(|err| err.message.as_ref().map(|message| message.to_string()))
                    .unwrap_or_else(|| format!("Invalid value of {}", field));
                (to_camel_case(&field), message)
            })
            .collect();
        ApiError::InvalidFields(fields)
    }
}

fn to_camel_case(field: &str) -> String {
    let mut result = String::with_capacity(field.len());
    let mut upper_next = false;
    for c in field.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            result.extend(c.to_uppercase());
            upper_next = false;
        } else {
            result.push(c);
        }
    }
    result
}

pub fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("Malformed request body: {}", err)).into()
}

pub fn query_error_handler(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("Invalid query parameters: {}", err)).into()
}

pub fn path_error_handler(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("Invalid path parameters: {}", err)).into()
}
