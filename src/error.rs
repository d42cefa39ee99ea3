//! Unified application error model and mapping helpers.
//! Every failing gate stage, the path resolver and the file responder return
//! an `AppError`; the HTTP layer maps it to a status code and a JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Unparseable or unsafe virtual path.
    #[error("{code}: {message}")]
    MalformedPath { code: String, message: String },
    /// Authenticated (or not) but not allowed to see this file.
    #[error("{code}: {message}")]
    Forbidden { code: String, message: String },
    /// Scope, module or file does not exist, or may not be known to exist.
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },
    /// Filesystem failures while serving an already authorized file.
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::MalformedPath { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::MalformedPath { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn malformed<S: Into<String>>(code: S, msg: S) -> Self { AppError::MalformedPath { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::MalformedPath { .. } => 400,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Internal { .. } => 500,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return AppError::not_found("file_not_found".to_string(), err.to_string());
        }
        AppError::Internal { code: "io_error".into(), message: err.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message(),
        });
        let mut resp = (status, Json(body)).into_response();
        crate::respond::apply_error_cache_headers(resp.headers_mut());
        resp
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
