use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{
    adapters::auth::AuthError,
    core::error::ControlError,
    ports::{mgmt_transport::TransportError, record_store::RecordStoreError},
};

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// An error on its way out of the HTTP adapter
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::NotFound(id) => Self::not_found(format!("ship not found: {id}")),
            ControlError::NotOnline(_) => {
                Self::new(StatusCode::NOT_FOUND, "NOT_ONLINE", "user not online")
            }
            ControlError::BadRequest(message) => Self::bad_request(message),
            ControlError::Upstream(message) => {
                Self::new(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", message)
            }
            ControlError::Transport(TransportError::Trap { message, .. }) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "COMMAND_TRAP", message)
            }
            ControlError::Transport(other) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PROTOCOL_ERROR",
                other.to_string(),
            ),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<RecordStoreError> for ApiError {
    fn from(err: RecordStoreError) -> Self {
        match err {
            RecordStoreError::Duplicate(what) => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", format!("{what} already exists"))
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(message) => Self::internal(message),
            other => Self::unauthorized(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = %self.status, code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
