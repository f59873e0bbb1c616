//! Cryptographic primitives for PageVault.
//!
//! This module provides:
//! - Authenticated encryption using AES-128-GCM
//! - Password key derivation using PBKDF2-HMAC-SHA256
//! - Password hashing using Argon2id
//! - Key types with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Decryption fails closed on any authentication error

pub mod aead;
pub mod kdf;
pub mod keys;
pub mod password;

pub use aead::{decrypt, encrypt, Aes128GcmCipher, Cipher};
pub use kdf::{derive_key, KdfParams, PBKDF2_ITERATIONS};
pub use keys::{PasswordKey, Salt, SymmetricKey, KEY_LENGTH, SALT_LENGTH};
pub use password::{hash_password, verify_password};
