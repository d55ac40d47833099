use tracing::info;

use super::ApiKeyGenerator;
use crate::error::{Error, Result};
use crate::store::{NewUser, Store};
use crate::types::{Role, User};
use crate::validation::validate_username;

/// Lookup prefixes are random; a clash just means drawing again.
const MAX_KEY_ATTEMPTS: usize = 3;

/// Creates a user with a fresh API key. Returns the user and the raw key,
/// which is never stored and cannot be recovered later.
pub fn create_user(
    store: &dyn Store,
    generator: &ApiKeyGenerator,
    username: &str,
    role: Role,
) -> Result<(User, String)> {
    validate_username(username).map_err(Error::InvalidValue)?;

    for _ in 0..MAX_KEY_ATTEMPTS {
        let key = generator.generate()?;

        match store.create_user(&NewUser {
            username: username.to_string(),
            display_name: username.to_string(),
            role,
            key_lookup: key.lookup,
            key_hash: key.hash,
        }) {
            Ok(user) => {
                info!(user_id = user.id, "Created {role} user {username}");
                return Ok((user, key.raw));
            }
            Err(Error::KeyLookupCollision) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(Error::KeyLookupCollision)
}
