//! One-way secret hashing applied to principal secrets before storage.

use crate::constants::HASH_FORMAT_MARKER;
use crate::error::{DirectoryError, DirectoryResult};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

/// Hashing collaborator used by the tree store and the credential service.
pub trait SecretHasher: Send + Sync {
    /// Hash a plain secret into a self-describing string.
    fn hash(&self, secret: &str) -> DirectoryResult<String>;

    /// Check a plain secret against a stored hash.
    fn verify(&self, secret: &str, hashed: &str) -> DirectoryResult<bool>;

    /// True if `value` already carries the hash-format marker.
    fn is_hashed(&self, value: &str) -> bool {
        value.starts_with(HASH_FORMAT_MARKER)
    }

    /// Hash unless the value is already hashed. Storing the same record twice
    /// must never double-hash it.
    fn hash_if_needed(&self, secret: &str) -> DirectoryResult<String> {
        if self.is_hashed(secret) {
            Ok(secret.to_string())
        } else {
            self.hash(secret)
        }
    }
}

/// Argon2id hasher producing PHC strings (`$argon2id$v=19$...`).
#[derive(Clone)]
pub struct Argon2SecretHasher {
    params: Params,
}

impl Default for Argon2SecretHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl Argon2SecretHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom cost parameters: memory in KiB, iterations, lanes.
    pub fn with_params(memory_cost: u32, time_cost: u32, parallelism: u32) -> DirectoryResult<Self> {
        let params = Params::new(memory_cost, time_cost, parallelism, None)
            .map_err(|e| DirectoryError::Hashing(format!("Invalid Argon2 params: {}", e)))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl SecretHasher for Argon2SecretHasher {
    fn hash(&self, secret: &str) -> DirectoryResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| DirectoryError::Hashing(format!("Secret hashing failed: {}", e)))
    }

    fn verify(&self, secret: &str, hashed: &str) -> DirectoryResult<bool> {
        let parsed = PasswordHash::new(hashed)
            .map_err(|e| DirectoryError::Hashing(format!("Stored hash is malformed: {}", e)))?;
        match self.argon2().verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(DirectoryError::Hashing(format!("Secret verification failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_hasher() -> Argon2SecretHasher {
        Argon2SecretHasher::with_params(1024, 1, 1).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = cheap_hasher();
        let hashed = hasher.hash("ChangeMe123!").unwrap();
        assert!(hashed.starts_with("$argon2id$"));
        assert!(hasher.verify("ChangeMe123!", &hashed).unwrap());
        assert!(!hasher.verify("wrong", &hashed).unwrap());
    }

    #[test]
    fn test_hash_if_needed_is_idempotent() {
        let hasher = cheap_hasher();
        let once = hasher.hash_if_needed("s3cret").unwrap();
        let twice = hasher.hash_if_needed(&once).unwrap();
        assert_eq!(once, twice);
        assert!(hasher.verify("s3cret", &twice).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        let hasher = cheap_hasher();
        assert!(hasher.verify("x", "not-a-hash").is_err());
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(Argon2SecretHasher::with_params(1, 1, 1).is_err());
    }
}
