//! Argon2id password hashing. Hashing is CPU-heavy by design, so both
//! operations run on `spawn_blocking` rather than blocking the async
//! runtime's worker threads.

use argon2::{Algorithm, Argon2, Params, Version};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::rngs::OsRng;

use crate::error::AuthError;

fn hasher(memory_kib: u32) -> Argon2<'static> {
    let params = Params::new(memory_kib, 2, 1, None).expect("valid argon2 params");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

pub async fn hash_password(password: String, memory_kib: u32) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        hasher(memory_kib)
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Hashing(e.to_string()))
    })
    .await
    .map_err(|e| AuthError::Hashing(e.to_string()))?
}

/// Verification is constant-time by construction: the PHC-format hash
/// string already encodes salt and parameters, so `verify_password`
/// derives the tag fresh and compares it without a separate
/// constant-time byte comparison.
pub async fn verify_password(password: String, hash: String, memory_kib: u32) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash).map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(hasher(memory_kib)
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| AuthError::Hashing(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MEMORY_KIB: u32 = 19456;

    #[tokio::test]
    async fn correct_password_verifies() {
        let hash = hash_password("correct horse battery staple".into(), TEST_MEMORY_KIB)
            .await
            .unwrap();
        assert!(verify_password("correct horse battery staple".into(), hash, TEST_MEMORY_KIB)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn wrong_password_fails() {
        let hash = hash_password("correct horse battery staple".into(), TEST_MEMORY_KIB)
            .await
            .unwrap();
        assert!(!verify_password("wrong password".into(), hash, TEST_MEMORY_KIB)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn hashes_are_salted_distinctly() {
        let a = hash_password("same password".into(), TEST_MEMORY_KIB).await.unwrap();
        let b = hash_password("same password".into(), TEST_MEMORY_KIB).await.unwrap();
        assert_ne!(a, b);
    }
}
