use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};

use crate::errors::LoaderError;

/// Turns a plaintext password into the string stored on the user record.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, username: &str, plaintext: &str) -> Result<String, LoaderError>;
}

/// Argon2id with a random salt, encoded as a PHC string.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Hasher;

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, username: &str, plaintext: &str) -> Result<String, LoaderError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| {
                LoaderError::Unexpected(format!("Password hashing failed for `{username}`: {e}"))
            })?
            .to_string();

        Ok(hash)
    }
}
