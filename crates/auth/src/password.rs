//! Argon2id password hashing.
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$...`), which embed the
//! salt and cost parameters, so hashes produced with different parameters
//! keep verifying after the configured cost changes.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;

/// Argon2 cost parameters, re-exported so callers can tune hashing cost.
pub use argon2::Params as PasswordParams;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// Argon2id hasher with fixed cost parameters.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: PasswordParams,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl PasswordHasher {
    pub fn new(params: PasswordParams) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `password` with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// `Ok(true)` on match, `Ok(false)` on mismatch; `Err` only for a bad hash.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
        Ok(self.argon2().verify_password(password.as_bytes(), &parsed).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(Params::new(8, 1, 1, None).unwrap())
    }

    #[test]
    fn hash_then_verify() {
        let hash = hasher().hash("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher().verify("correct horse", &hash).unwrap());
        assert!(!hasher().verify("battery staple", &hash).unwrap());
    }

    #[test]
    fn salts_differ() {
        let a = hasher().hash("pw").unwrap();
        let b = hasher().hash("pw").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verifies_hashes_made_with_other_params() {
        let hash = hasher().hash("pw").unwrap();
        let stronger = PasswordHasher::new(Params::new(16, 2, 1, None).unwrap());
        assert!(stronger.verify("pw", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let err = hasher().verify("pw", "plaintext").unwrap_err();
        assert!(matches!(err, PasswordError::MalformedHash(_)));
    }
}
