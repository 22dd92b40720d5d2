use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::commands::Error;

/// Command error rendered as a JSON response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn unauthorized(message: &'static str) -> Self {
        Self(Error::Unauthorized(message.into()))
    }

    pub fn forbidden(message: &'static str) -> Self {
        Self(Error::Forbidden(message.into()))
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self(Error::InvalidInput(message.into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            Error::InsufficientResources(_) => (StatusCode::CONFLICT, "insufficient_resources"),
            Error::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
            Error::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
            Error::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Error::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Error::IoFailure(_) => (StatusCode::BAD_GATEWAY, "io_failure"),
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        json_error(status, code, self.0.to_string())
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
