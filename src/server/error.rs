//! HTTP error mapping.
//!
//! Bridges the domain taxonomy onto transport responses at the boundary
//! only; handlers return `Result<_, ApiError>` and the conversion below is
//! the single place status codes are decided.

use crate::error::RegistrationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiError {
    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        let status = match &err {
            RegistrationError::EventClosed
            | RegistrationError::AlreadyRegistered
            | RegistrationError::DuplicateRegistration
            | RegistrationError::DuplicateEntry
            | RegistrationError::EventFull
            | RegistrationError::SeatUnavailableRefundRequired => StatusCode::CONFLICT,
            RegistrationError::TamperedPayment | RegistrationError::MalformedWebhook(_) => {
                StatusCode::BAD_REQUEST
            }
            RegistrationError::NoMatchingIntent
            | RegistrationError::NotRegistered
            | RegistrationError::NotFound(_)
            | RegistrationError::EventMissing(_) => StatusCode::NOT_FOUND,
            RegistrationError::Gateway(_) => StatusCode::BAD_GATEWAY,
            RegistrationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = %self.code, message = %self.message, "request failed");
        }
        (
            self.status,
            Json(ErrorBody {
                code: self.code,
                message: self.message,
            }),
        )
            .into_response()
    }
}
