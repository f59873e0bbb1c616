//! Secret cache trait definition.
//!
//! The cache holds session tokens, session counters and password-derived keys.
//! Every operation touches exactly one key; there are no multi-key
//! transactions, so callers must tolerate interleaved read-then-write pairs.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use pagevault_common::{Error, Result};

/// A cached value: either a counter/id or an opaque byte string.
#[derive(Clone, PartialEq, Eq)]
pub enum CacheValue {
    Int(i64),
    Bytes(Vec<u8>),
}

impl fmt::Debug for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheValue::Int(n) => write!(f, "Int({})", n),
            CacheValue::Bytes(b) => write!(f, "Bytes([REDACTED; {} bytes])", b.len()),
        }
    }
}

/// Key-value cache with optional per-entry expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Backend name (e.g., "memory").
    fn name(&self) -> &str;

    /// Get a value. Missing or expired keys are `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<CacheValue>>;

    /// Set a value without expiry.
    async fn set(&self, key: &str, value: CacheValue) -> Result<()>;

    /// Set a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<()>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Get an integer value.
    ///
    /// # Errors
    /// - `Serialization` if the key holds bytes
    async fn get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key).await? {
            None => Ok(None),
            Some(CacheValue::Int(n)) => Ok(Some(n)),
            Some(CacheValue::Bytes(_)) => Err(Error::Serialization(format!(
                "Cache key '{}' does not hold an integer",
                key
            ))),
        }
    }

    /// Get a byte-string value.
    ///
    /// # Errors
    /// - `Serialization` if the key holds an integer
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.get(key).await? {
            None => Ok(None),
            Some(CacheValue::Bytes(bytes)) => Ok(Some(bytes)),
            Some(CacheValue::Int(_)) => Err(Error::Serialization(format!(
                "Cache key '{}' does not hold bytes",
                key
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_bytes() {
        let value = CacheValue::Bytes(vec![0x41; 16]);
        assert_eq!(format!("{:?}", value), "Bytes([REDACTED; 16 bytes])");
        assert_eq!(format!("{:?}", CacheValue::Int(3)), "Int(3)");
    }
}
