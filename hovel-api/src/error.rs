use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use hovel_core::error::HovelError;

pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP-facing error: a status, a message and a stable machine code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            code: "not_found",
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            code: "invalid_request",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.message, "code": self.code })),
        )
            .into_response()
    }
}

impl From<HovelError> for ApiError {
    fn from(err: HovelError) -> Self {
        let status = match &err {
            HovelError::InvalidRequest(_)
            | HovelError::UnknownService(_)
            | HovelError::NoServices
            | HovelError::NotRunning(_) => StatusCode::BAD_REQUEST,
            HovelError::CredentialInvalid(_) => StatusCode::UNAUTHORIZED,
            HovelError::NotFound(_) => StatusCode::NOT_FOUND,
            HovelError::Conflict(_) => StatusCode::CONFLICT,
            HovelError::CredentialTransient(_) | HovelError::PortExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}
