use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, header::WWW_AUTHENTICATE, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{KeyValidationError, extract_key, validate_key};
use crate::server::AppState;
use crate::types::User;

/// Extractor that requires a valid API key belonging to an active user.
pub struct RequireUser(pub User);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidKey,
    InactiveUser,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "authentication required"),
            AuthError::InvalidKey => (StatusCode::UNAUTHORIZED, "invalid api key"),
            AuthError::InactiveUser => (StatusCode::UNAUTHORIZED, "account is deactivated"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        };

        let body = json!({ "errors": [message] });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"berth\""),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let raw_key = extract_key(auth_header, parts.uri.query()).ok_or(AuthError::MissingAuth)?;

        let user = validate_key(state.store.as_ref(), &raw_key).map_err(|e| match e {
            KeyValidationError::InvalidKey => AuthError::InvalidKey,
            KeyValidationError::InactiveUser => AuthError::InactiveUser,
            KeyValidationError::InternalError => AuthError::InternalError,
        })?;

        Ok(RequireUser(user))
    }
}
