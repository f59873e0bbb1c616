//! Password-based key derivation using PBKDF2-HMAC-SHA256.
//!
//! The derived key only ever wraps a user's master key, so the iteration count
//! is part of the stored data format: every `main_key_encrypted` in storage was
//! produced under it. Changing it strands existing accounts.

use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::keys::{PasswordKey, Salt, KEY_LENGTH};
use pagevault_common::{Error, Result};

/// PBKDF2 rounds used for every stored account.
pub const PBKDF2_ITERATIONS: u32 = 300_000;

/// Parameters for PBKDF2 key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of HMAC-SHA256 rounds.
    pub iterations: u32,
}

impl KdfParams {
    /// The parameters all stored wrapped keys were produced with.
    pub const fn standard() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Custom iteration count.
    ///
    /// Only for tests and benchmarks; data derived under anything other than
    /// [`KdfParams::standard`] cannot be opened by a production context.
    pub const fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::standard()
    }
}

/// Derive the password key for a user.
///
/// # Postconditions
/// - Same (password, salt, params) always yields the same key
/// - Different salts yield unrelated keys
///
/// # Errors
/// - Returns error if `params.iterations` is zero
///
/// # Security
/// - Deliberately slow; callers on an async executor should run this on a
///   blocking thread
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<PasswordKey> {
    if params.iterations == 0 {
        return Err(Error::Crypto("KDF iteration count must be non-zero".to_string()));
    }

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password, salt.as_bytes(), params.iterations, &mut key);

    let derived = PasswordKey::from_bytes(key);
    zeroize::Zeroize::zeroize(&mut key);
    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::with_iterations(1_000)
    }

    #[test]
    fn test_derive_key_deterministic() {
        let password = b"test-password-123";
        let salt = Salt::from_bytes([42u8; 16]);

        let key1 = derive_key(password, &salt, &fast()).unwrap();
        let key2 = derive_key(password, &salt, &fast()).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salt() {
        let password = b"test-password-123";
        let salt1 = Salt::from_bytes([1u8; 16]);
        let salt2 = Salt::from_bytes([2u8; 16]);

        let key1 = derive_key(password, &salt1, &fast()).unwrap();
        let key2 = derive_key(password, &salt2, &fast()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_password() {
        let salt = Salt::from_bytes([42u8; 16]);

        let key1 = derive_key(b"password1", &salt, &fast()).unwrap();
        let key2 = derive_key(b"password2", &salt, &fast()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_iterations_change_the_key() {
        let salt = Salt::from_bytes([5u8; 16]);

        let key1 = derive_key(b"pw", &salt, &KdfParams::with_iterations(1_000)).unwrap();
        let key2 = derive_key(b"pw", &salt, &KdfParams::with_iterations(1_001)).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let salt = Salt::from_bytes([0u8; 16]);
        assert!(derive_key(b"pw", &salt, &KdfParams::with_iterations(0)).is_err());
    }

    #[test]
    fn test_standard_params_are_pinned() {
        assert_eq!(KdfParams::default().iterations, 300_000);
    }
}
