use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::services::ingest::IngestError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Validation(Vec<String>),
    StorageUnavailable(anyhow::Error),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code, details) = match self {
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                msg,
                "BAD_REQUEST".to_string(),
                None,
            ),
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                "VALIDATION_ERROR".to_string(),
                Some(serde_json::json!({ "errors": errors })),
            ),
            AppError::StorageUnavailable(err) => {
                tracing::error!("Session storage unavailable: {:?}", err);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage temporarily unavailable, try again later".to_string(),
                    "STORAGE_UNAVAILABLE".to_string(),
                    None,
                )
            }
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_SERVER_ERROR".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code,
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(messages) => AppError::Validation(messages),
            IngestError::Storage(err) => AppError::StorageUnavailable(err.into()),
        }
    }
}

/// Flattens validator output into `field: code` strings.
pub fn validation_messages(errors: &validator::ValidationErrors) -> Vec<String> {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let code = e.code.as_ref();
                format!("{}: {}", field, code)
            })
        })
        .collect();
    messages.sort();
    messages
}
