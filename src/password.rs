//! Password hashing and verification.
//!
//! bcrypt is CPU-bound, so the async entry points move the work onto the
//! blocking pool.

use std::sync::OnceLock;

use thiserror::Error;

/// bcrypt cost factor (2^10 rounds).
pub const HASH_COST: u32 = 10;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("Password hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Hash a plaintext password with a fresh salt.
pub fn hash_password(plaintext: &str) -> Result<String, PasswordError> {
    Ok(bcrypt::hash(plaintext, HASH_COST)?)
}

/// Compare a plaintext password with a stored hash.
///
/// A stored hash that cannot be parsed counts as a mismatch.
pub fn verify_password(plaintext: &str, stored_hash: &str) -> bool {
    match bcrypt::verify(plaintext, stored_hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be verified");
            false
        }
    }
}

/// Verify against a throwaway hash so that a login for an unknown account
/// costs the same as one for a known account with a wrong password.
pub async fn verify_dummy_blocking(plaintext: String) -> Result<(), PasswordError> {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();
    tokio::task::spawn_blocking(move || {
        let hash = DUMMY_HASH.get_or_init(|| hash_password("dummy-password").unwrap_or_default());
        verify_password(&plaintext, hash);
    })
    .await?;
    Ok(())
}

/// Hash on the blocking pool.
pub async fn hash_password_blocking(plaintext: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&plaintext)).await?
}

/// Verify on the blocking pool.
pub async fn verify_password_blocking(
    plaintext: String,
    stored_hash: String,
) -> Result<bool, PasswordError> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&plaintext, &stored_hash)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_correct() {
        let hash = hash_password("password1").unwrap();
        assert!(verify_password("password1", &hash));
    }

    #[test]
    fn test_verify_wrong_password() {
        let hash = hash_password("password1").unwrap();
        assert!(!verify_password("password2", &hash));
    }

    #[test]
    fn test_hash_is_salted() {
        let hash1 = hash_password("same-password").unwrap();
        let hash2 = hash_password("same-password").unwrap();
        assert_ne!(hash1, hash2);
        assert!(verify_password("same-password", &hash1));
        assert!(verify_password("same-password", &hash2));
    }

    #[test]
    fn test_hash_uses_configured_cost() {
        let hash = hash_password("password1").unwrap();
        assert!(hash.starts_with("$2b$10$"), "unexpected hash prefix: {hash}");
    }

    #[test]
    fn test_malformed_hash_is_mismatch() {
        assert!(!verify_password("password1", "not-a-bcrypt-hash"));
    }

    #[tokio::test]
    async fn test_dummy_verification_completes() {
        verify_dummy_blocking("anything".into()).await.unwrap();
        verify_dummy_blocking("again".into()).await.unwrap();
    }

    #[tokio::test]
    async fn test_blocking_wrappers() {
        let hash = hash_password_blocking("password1".into()).await.unwrap();
        assert!(
            verify_password_blocking("password1".into(), hash.clone())
                .await
                .unwrap()
        );
        assert!(
            !verify_password_blocking("nope".into(), hash)
                .await
                .unwrap()
        );
    }
}
