//! Password hashing for sign-in checks.
//!
//! This is separate from key derivation: the hash proves knowledge of the
//! password, the derived key opens the master key. Hashes are Argon2id PHC
//! strings so parameters travel with each stored hash.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::keys::{random_bytes, SALT_LENGTH};
use pagevault_common::{Error, Result};

/// Hash a password into an Argon2id PHC string.
pub fn hash_password(password: &[u8]) -> Result<String> {
    let salt_bytes: [u8; SALT_LENGTH] = random_bytes()?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| Error::Crypto(format!("Invalid password salt: {}", e)))?;

    let hash = Argon2::default()
        .hash_password(password, &salt)
        .map_err(|e| Error::Crypto(format!("Password hashing failed: {}", e)))?;

    Ok(hash.to_string())
}

/// Check a password against a stored PHC string.
///
/// # Errors
/// - `AuthenticationFailure` on mismatch
/// - `Crypto` if the stored hash cannot be parsed
pub fn verify_password(stored_hash: &[u8], password: &[u8]) -> Result<()> {
    let stored = std::str::from_utf8(stored_hash)
        .map_err(|_| Error::Crypto("Stored password hash is not UTF-8".to_string()))?;
    let parsed = PasswordHash::new(stored)
        .map_err(|e| Error::Crypto(format!("Stored password hash is invalid: {}", e)))?;

    Argon2::default()
        .verify_password(password, &parsed)
        .map_err(|_| Error::AuthenticationFailure("Invalid password".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password(b"correcthorse").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(hash.as_bytes(), b"correcthorse").is_ok());
    }

    #[test]
    fn test_wrong_password_is_authentication_failure() {
        let hash = hash_password(b"correcthorse").unwrap();

        let result = verify_password(hash.as_bytes(), b"batterystaple");
        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
    }

    #[test]
    fn test_hashes_are_salted() {
        let h1 = hash_password(b"same").unwrap();
        let h2 = hash_password(b"same").unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_garbage_hash_is_not_an_auth_failure() {
        let result = verify_password(b"not-a-phc-string", b"pw");
        assert!(matches!(result, Err(Error::Crypto(_))));
    }
}
