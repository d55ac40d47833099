mod accounts;
mod helpers;
mod middleware;
mod ownership;
mod token;

pub use accounts::create_user;
pub use helpers::{KeyValidationError, extract_key, validate_key};
pub use middleware::{AuthError, RequireUser};
pub use ownership::can_access;
pub use token::{ApiKeyGenerator, parse_key};
