//! Password Hashing and Verification
//!
//! bcrypt with a fixed work factor. Hashing and verification are CPU-bound
//! and deliberately slow, so both run on tokio's blocking pool and never
//! stall the request workers.

use bcrypt::{hash, verify};

use crate::error::{AppError, ValidationError};
use crate::validators::MAX_PASSWORD_BYTES;

/// Plaintext hashed once at construction. Verifying against its digest lets
/// a login for an unknown email spend the same time as a real check.
const DUMMY_PASSWORD: &str = "calixio-timing-equalizer";

#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    dummy_hash: String,
}

impl PasswordHasher {
    /// Create a hasher with the given bcrypt cost
    ///
    /// # Errors
    /// Returns error if the cost is outside bcrypt's accepted range
    pub fn new(cost: u32) -> Result<Self, AppError> {
        let dummy_hash = hash(DUMMY_PASSWORD, cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;
        Ok(Self { cost, dummy_hash })
    }

    /// Hash a password
    ///
    /// # Errors
    /// - `ValidationError::TooLong` for input bcrypt would truncate
    /// - internal error if bcrypt fails or the blocking task is cancelled
    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(ValidationError::TooLong("password", MAX_PASSWORD_BYTES).into());
        }

        let password = password.to_string();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || hash(password, cost))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against its digest
    ///
    /// A wrong password, a malformed digest and input longer than any
    /// hashable password all yield `Ok(false)`.
    ///
    /// # Errors
    /// Returns error only if the blocking task itself fails
    pub async fn verify(&self, digest: &str, password: &str) -> Result<bool, AppError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Ok(false);
        }

        let password = password.to_string();
        let digest = digest.to_string();

        let outcome = tokio::task::spawn_blocking(move || verify(password, &digest))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?;

        match outcome {
            Ok(valid) => Ok(valid),
            Err(e) => {
                tracing::warn!("Stored password digest could not be verified: {}", e);
                Ok(false)
            }
        }
    }

    /// Burn one verification against the dummy digest. The result is
    /// discarded.
    pub async fn verify_dummy(&self, password: &str) -> Result<(), AppError> {
        let dummy_hash = self.dummy_hash.clone();
        self.verify(&dummy_hash, password).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Lowest cost bcrypt accepts; keeps the suite fast.
    const TEST_COST: u32 = 4;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(TEST_COST).unwrap()
    }

    #[tokio::test]
    async fn test_hash_password() {
        let password = "password123";
        let hash = hasher().hash(password).await.expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let hasher = hasher();
        let first = hasher.hash("password123").await.unwrap();
        let second = hasher.hash("password123").await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_verify_password() {
        let hasher = hasher();
        let hash = hasher.hash("password123").await.unwrap();

        assert!(hasher.verify(&hash, "password123").await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_wrong_password() {
        let hasher = hasher();
        let hash = hasher.hash("password123").await.unwrap();

        assert!(!hasher.verify(&hash, "password124").await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_digest_is_not_an_error() {
        let valid = hasher().verify("not-a-bcrypt-digest", "password123").await;

        assert!(matches!(valid, Ok(false)));
    }

    #[tokio::test]
    async fn test_verify_dummy() {
        assert!(hasher().verify_dummy("anything").await.is_ok());
    }

    #[tokio::test]
    async fn test_hash_refuses_input_past_72_bytes() {
        let result = hasher().hash(&format!("{}correct-tail", "a".repeat(72))).await;

        assert!(matches!(
            result,
            Err(AppError::Validation(ValidationError::TooLong("password", 72)))
        ));
    }

    #[tokio::test]
    async fn test_verify_rejects_longer_password_with_same_prefix() {
        let hasher = hasher();
        let prefix = "a".repeat(72);
        let hash = hasher.hash(&prefix).await.unwrap();

        assert!(hasher.verify(&hash, &prefix).await.unwrap());
        assert!(!hasher.verify(&hash, &format!("{}WRONG", prefix)).await.unwrap());
    }

    #[test]
    fn test_invalid_cost() {
        assert!(PasswordHasher::new(2).is_err());
    }
}
