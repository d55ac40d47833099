use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::blob::BlobError;
use crate::builds::EngineError;
use crate::error::Result as StoreResult;

/// Seconds a client should wait before retrying after a blob store timeout.
const RETRY_AFTER_SECS: &str = "5";

/// API error that converts to a proper HTTP response.
///
/// The body is always `{"errors": [message]}`, which is what the upload
/// client parses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "errors": [self.message] });
        let mut response = (self.status, Json(body)).into_response();

        if self.status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }

        response
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::MalformedInput(msg) | EngineError::UploadVerificationFailed(msg) => {
                Self::bad_request(msg)
            }
            EngineError::AccessDenied => Self::forbidden("access denied"),
            e @ EngineError::NotFound(_) => Self::not_found(e.to_string()),
            e @ EngineError::Timeout => Self::unavailable(e.to_string()),
            EngineError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                Self::internal("internal server error")
            }
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::NotFound => Self::not_found("object not found"),
            BlobError::InvalidPath(_) => Self::bad_request(e.to_string()),
            BlobError::Signature => Self::forbidden(e.to_string()),
            BlobError::AlreadyExists => Self::conflict(e.to_string()),
            BlobError::Io(e) => {
                tracing::error!("Blob store io error: {e}");
                Self::internal("storage error")
            }
        }
    }
}

/// Extension trait for converting store results to API errors with a custom message.
pub trait StoreResultExt<T> {
    fn api_err(self, message: &'static str) -> Result<T, ApiError>;
}

impl<T> StoreResultExt<T> for StoreResult<T> {
    fn api_err(self, message: &'static str) -> Result<T, ApiError> {
        self.map_err(|e| {
            tracing::error!("{message}: {e}");
            ApiError::internal(message)
        })
    }
}
