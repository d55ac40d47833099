use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::{HeaderValue, header::CONTENT_TYPE},
};
use serde::de::DeserializeOwned;

use crate::server::response::ApiError;

/// Request body that is either JSON or form encoded, chosen by Content-Type.
///
/// Bodies without a Content-Type are read as forms, which is what the
/// upload client sends.
pub struct WharfBody<T>(pub T);

impl<S, T> FromRequest<S> for WharfBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(mut req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);

        match content_type {
            Some(ct) if ct.contains("application/json") => {
                let Json(value) = Json::<T>::from_request(req, state)
                    .await
                    .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e.body_text())))?;
                Ok(Self(value))
            }
            content_type => {
                if content_type.is_none() {
                    req.headers_mut().insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("application/x-www-form-urlencoded"),
                    );
                }
                let Form(value) = Form::<T>::from_request(req, state)
                    .await
                    .map_err(|e| ApiError::bad_request(format!("invalid form data: {}", e.body_text())))?;
                Ok(Self(value))
            }
        }
    }
}
