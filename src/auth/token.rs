use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;

use crate::error::{Error, Result};

const ARGON2_MEMORY: u32 = 64 * 1024; // 64KB
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const KEY_PREFIX: &str = "berth";
const LOOKUP_LENGTH: usize = 8;
const SECRET_LENGTH: usize = 24;
const SECRET_BYTES: usize = 12;

/// A freshly minted API key. `raw` is shown to the user exactly once.
pub struct GeneratedKey {
    pub raw: String,
    pub lookup: String,
    pub hash: String,
}

pub struct ApiKeyGenerator {
    argon2: Argon2<'static>,
}

impl Default for ApiKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiKeyGenerator {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .expect("invalid argon2 params");

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Generates a new key with the format: berth_<lookup>_<secret>
    pub fn generate(&self) -> Result<GeneratedKey> {
        let lookup = generate_lookup();
        let secret = generate_secret();
        let raw = format!("{KEY_PREFIX}_{lookup}_{secret}");
        let hash = self.hash(&raw)?;
        Ok(GeneratedKey { raw, lookup, hash })
    }

    pub fn hash(&self, key: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(key.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("failed to hash api key: {e}")))?;
        Ok(hash.to_string())
    }

    pub fn verify(&self, key: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("invalid hash format: {e}")))?;

        match self.argon2.verify_password(key.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Config(format!("failed to verify api key: {e}"))),
        }
    }
}

fn generate_lookup() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    uuid[..LOOKUP_LENGTH].to_string()
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)[..SECRET_LENGTH].to_string()
}

/// Splits a key into (lookup, secret) after checking its shape.
pub fn parse_key(key: &str) -> Result<(String, String)> {
    let mut parts = key.split('_');

    let (Some(prefix), Some(lookup), Some(secret), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::InvalidKeyFormat);
    };

    if prefix != KEY_PREFIX || lookup.len() != LOOKUP_LENGTH || secret.len() != SECRET_LENGTH {
        return Err(Error::InvalidKeyFormat);
    }

    Ok((lookup.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation_format() {
        let generator = ApiKeyGenerator::new();
        let key = generator.generate().unwrap();

        assert!(key.raw.starts_with("berth_"));
        assert_eq!(key.lookup.len(), 8);

        let parts: Vec<&str> = key.raw.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1], key.lookup);
        assert_eq!(parts[2].len(), 24);
    }

    #[test]
    fn test_key_verification() {
        let generator = ApiKeyGenerator::new();
        let key = generator.generate().unwrap();

        assert!(generator.verify(&key.raw, &key.hash).unwrap());

        let wrong = format!("{}ffff", &key.raw[..key.raw.len() - 4]);
        assert!(!generator.verify(&wrong, &key.hash).unwrap());
    }

    #[test]
    fn test_parse_key_valid() {
        let (lookup, secret) = parse_key("berth_12345678_123456789012345678901234").unwrap();
        assert_eq!(lookup, "12345678");
        assert_eq!(secret, "123456789012345678901234");
    }

    #[test]
    fn test_parse_key_rejects_malformed() {
        assert!(parse_key("cutter_12345678_123456789012345678901234").is_err());
        assert!(parse_key("berth_12345678").is_err());
        assert!(parse_key("berth_1234_123456789012345678901234").is_err());
        assert!(parse_key("berth_12345678_123456789012345678901234_x").is_err());
    }

    #[test]
    fn test_hash_is_phc_format() {
        let generator = ApiKeyGenerator::new();
        let key = generator.generate().unwrap();

        assert!(key.hash.starts_with("$argon2id$"));
    }
}
