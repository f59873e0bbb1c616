//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use aes_gcm::aead::{rand_core::RngCore, OsRng};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use pagevault_common::{Error, Result};

/// Length of symmetric keys in bytes (128-bit).
pub const KEY_LENGTH: usize = 16;

/// Length of key-derivation salts in bytes (128-bit).
pub const SALT_LENGTH: usize = 16;

/// Fill an array from the operating system RNG.
pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Crypto(format!("Random source failed: {}", e)))?;
    Ok(bytes)
}

fn exact_length<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        Error::Crypto(format!(
            "Invalid {} length: expected {}, got {}",
            what,
            N,
            bytes.len()
        ))
    })
}

/// A plaintext data key: a user's master key or a page key.
///
/// Only the envelope layer ever holds one of these, and only for the length of
/// a single call.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; KEY_LENGTH],
}

impl SymmetricKey {
    /// Generate a random key.
    pub fn generate() -> Result<Self> {
        Ok(Self {
            key: random_bytes()?,
        })
    }

    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a key from a slice, e.g. freshly unwrapped plaintext.
    ///
    /// # Errors
    /// - Returns error if the slice is not KEY_LENGTH bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: exact_length(bytes, "key")?,
        })
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// Key derived from a user's password and encryption salt.
///
/// Its only use is wrapping and unwrapping that user's master key. It is the
/// one secret that lives in the session cache.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PasswordKey {
    key: [u8; KEY_LENGTH],
}

impl PasswordKey {
    /// Create a password key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Rebuild a password key read back from the cache.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: exact_length(bytes, "password key")?,
        })
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for PasswordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PasswordKey([REDACTED])")
    }
}

/// Salt for key derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Result<Self> {
        Ok(Self(random_bytes()?))
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create from a stored salt column.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self(exact_length(bytes, "salt")?))
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_key_generate() {
        let key1 = SymmetricKey::generate().unwrap();
        let key2 = SymmetricKey::generate().unwrap();

        // Random keys should be different
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_salt_generate() {
        let salt1 = Salt::generate().unwrap();
        let salt2 = Salt::generate().unwrap();

        assert_ne!(salt1.as_bytes(), salt2.as_bytes());
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(SymmetricKey::from_slice(&[0u8; 32]).is_err());
        assert!(PasswordKey::from_slice(&[0u8; 15]).is_err());
        assert!(Salt::from_slice(&[]).is_err());
        assert!(SymmetricKey::from_slice(&[7u8; KEY_LENGTH]).is_ok());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SymmetricKey::from_bytes([0x41; KEY_LENGTH]);
        assert_eq!(format!("{:?}", key), "SymmetricKey([REDACTED])");
    }
}
