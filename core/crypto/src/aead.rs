//! Authenticated encryption using AES-128-GCM.
//!
//! Every call draws a fresh 96-bit nonce and prepends it to the output, so a
//! record is self-describing: `nonce || ciphertext || tag`.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes128Gcm, Nonce,
};

use crate::keys::KEY_LENGTH;
use pagevault_common::{Error, Result};

/// Nonce size for AES-GCM (12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

fn cipher_for(key: &[u8]) -> Result<Aes128Gcm> {
    if key.len() != KEY_LENGTH {
        return Err(Error::Crypto(format!(
            "Invalid key length: expected {}, got {}",
            KEY_LENGTH,
            key.len()
        )));
    }
    Aes128Gcm::new_from_slice(key).map_err(|e| Error::Crypto(format!("Invalid key: {}", e)))
}

/// Encrypt plaintext using AES-128-GCM.
///
/// # Preconditions
/// - `key` must be exactly KEY_LENGTH bytes
/// - `plaintext` can be any size, including empty
///
/// # Postconditions
/// - Returns nonce || ciphertext || tag
/// - The ciphertext length is plaintext length + TAG_SIZE + NONCE_SIZE
///
/// # Errors
/// - Returns error if key length is incorrect
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce = Aes128Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt a record produced by [`encrypt`].
///
/// # Errors
/// - `Crypto` if the key length is incorrect
/// - `AuthenticationFailure` if the record is shorter than NONCE_SIZE + TAG_SIZE
/// - `AuthenticationFailure` if the tag does not verify (wrong key, tampering)
///
/// # Security
/// - Never returns partial plaintext
pub fn decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;

    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::AuthenticationFailure(
            "Ciphertext too short".to_string(),
        ));
    }

    let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, sealed)
        .map_err(|_| Error::AuthenticationFailure("Decryption failed".to_string()))
}

/// Capability set of a symmetric cipher.
pub trait Cipher: Send + Sync {
    /// Algorithm name, for logs.
    fn name(&self) -> &str;

    /// Seal `plaintext` under `key`.
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>>;

    /// Open a sealed record; fails closed.
    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>>;
}

/// The production cipher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes128GcmCipher;

impl Cipher for Aes128GcmCipher {
    fn name(&self) -> &str {
        "aes-128-gcm"
    }

    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        encrypt(key, plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        decrypt(key, ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Hello, World!";

        let ciphertext = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &ciphertext).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_ciphertext_size() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Test message";

        let ciphertext = encrypt(&key, plaintext).unwrap();

        assert_eq!(ciphertext.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_different_nonce_each_time() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Same plaintext";

        let ct1 = encrypt(&key, plaintext).unwrap();
        let ct2 = encrypt(&key, plaintext).unwrap();

        assert_ne!(&ct1[..NONCE_SIZE], &ct2[..NONCE_SIZE]);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_wrong_key_is_authentication_failure() {
        let key1 = [1u8; KEY_LENGTH];
        let key2 = [2u8; KEY_LENGTH];

        let ciphertext = encrypt(&key1, b"Secret data").unwrap();
        let result = decrypt(&key2, &ciphertext);

        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
    }

    #[test]
    fn test_truncated_record_fails_closed() {
        let key = [42u8; KEY_LENGTH];
        let ciphertext = encrypt(&key, b"").unwrap();
        assert_eq!(ciphertext.len(), NONCE_SIZE + TAG_SIZE);

        let result = decrypt(&key, &ciphertext[..NONCE_SIZE + TAG_SIZE - 1]);
        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
        assert!(matches!(
            decrypt(&key, &[]),
            Err(Error::AuthenticationFailure(_))
        ));
    }

    #[test]
    fn test_invalid_key_length() {
        let long_key = [0u8; 32];

        assert!(matches!(encrypt(&long_key, b"data"), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = [42u8; KEY_LENGTH];

        let ciphertext = encrypt(&key, b"").unwrap();
        let decrypted = decrypt(&key, &ciphertext).unwrap();

        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_cipher_trait_object() {
        let cipher: Box<dyn Cipher> = Box::new(Aes128GcmCipher);
        let key = [9u8; KEY_LENGTH];

        let sealed = cipher.encrypt(b"page body", &key).unwrap();
        assert_eq!(cipher.decrypt(&sealed, &key).unwrap(), b"page body");
        assert_eq!(cipher.name(), "aes-128-gcm");
    }

    proptest! {
        #[test]
        fn prop_roundtrip(key in any::<[u8; KEY_LENGTH]>(), plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let sealed = encrypt(&key, &plaintext).unwrap();
            prop_assert_eq!(decrypt(&key, &sealed).unwrap(), plaintext);
        }

        #[test]
        fn prop_any_bit_flip_is_rejected(
            plaintext in proptest::collection::vec(any::<u8>(), 0..128),
            position in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let key = [42u8; KEY_LENGTH];
            let mut sealed = encrypt(&key, &plaintext).unwrap();
            let idx = position.index(sealed.len());
            sealed[idx] ^= 1 << bit;

            let result = decrypt(&key, &sealed);
            prop_assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
        }
    }
}
