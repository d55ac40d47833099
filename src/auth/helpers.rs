use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{ApiKeyGenerator, parse_key};
use crate::store::Store;
use crate::types::User;

#[derive(Debug)]
pub enum KeyValidationError {
    InvalidKey,
    InactiveUser,
    InternalError,
}

/// Pulls an API key out of whichever carrier the client used.
///
/// Accepted forms, in order:
/// - `Authorization: Bearer <key>`
/// - `Authorization: Basic base64(x-token:<key>)`
/// - `Authorization: access_token=<key>`
/// - `Authorization: <key>`
/// - `?api_key=<key>` (the value may itself carry an `access_token=` prefix)
#[must_use]
pub fn extract_key(auth_header: Option<&str>, query: Option<&str>) -> Option<String> {
    if let Some(header) = auth_header.map(str::trim).filter(|h| !h.is_empty()) {
        if let Some(key) = header.strip_prefix("Bearer ") {
            return non_empty(strip_access_token(key.trim()));
        }
        if header.starts_with("Basic ") {
            return extract_basic_auth_key(header);
        }
        return non_empty(strip_access_token(header));
    }

    query.and_then(api_key_from_query)
}

fn strip_access_token(value: &str) -> &str {
    value.strip_prefix("access_token=").unwrap_or(value)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Expects format: Basic base64(x-token:actual_key)
fn extract_basic_auth_key(header: &str) -> Option<String> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (username, password) = credentials.split_once(':')?;
    if username != "x-token" {
        return None;
    }

    non_empty(password)
}

fn api_key_from_query(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name != "api_key" {
            return None;
        }
        let value = urlencoding::decode(value).ok()?;
        non_empty(strip_access_token(&value))
    })
}

/// Resolves a raw key to its active user.
pub fn validate_key(store: &dyn Store, raw_key: &str) -> Result<User, KeyValidationError> {
    let (lookup, _secret) = parse_key(raw_key).map_err(|_| KeyValidationError::InvalidKey)?;

    let user = store
        .get_user_by_key_lookup(&lookup)
        .map_err(|_| KeyValidationError::InternalError)?
        .ok_or(KeyValidationError::InvalidKey)?;

    let generator = ApiKeyGenerator::new();
    if !generator
        .verify(raw_key, &user.key_hash)
        .map_err(|_| KeyValidationError::InternalError)?
    {
        return Err(KeyValidationError::InvalidKey);
    }

    if !user.is_active {
        return Err(KeyValidationError::InactiveUser);
    }

    Ok(user)
}
