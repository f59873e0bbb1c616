//! Common error types for PageVault.

use std::fmt;
use thiserror::Error;

/// Step of a page save that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    /// Minting the page key or creating the empty page row and owner permission.
    Provision,
    /// Encrypting and writing title and body.
    Populate,
}

impl fmt::Display for SavePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SavePhase::Provision => write!(f, "provision"),
            SavePhase::Populate => write!(f, "populate"),
        }
    }
}

/// Top-level error type for PageVault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Password mismatch, stale session key, or AEAD tag mismatch.
    #[error("Authentication failure: {0}")]
    AuthenticationFailure(String),

    /// Caller is authenticated but not authorized for the action.
    #[error("Permission conflict: {0}")]
    PermissionConflict(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bearer header or cookie had the wrong shape.
    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    /// Cache or persistent store I/O failed.
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cryptographic primitive misuse (bad key length, RNG failure).
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A page save stopped part way through.
    #[error("Page save failed during {phase}: {source}")]
    PageSave {
        phase: SavePhase,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TransientStore(_) | Error::Io(_) => true,
            Error::PageSave { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Message safe to show outside the process.
    ///
    /// Missing pages, missing permissions and failed key unwraps all map to the
    /// same text so callers cannot tell which pages exist.
    pub fn boundary_message(&self) -> &'static str {
        match self {
            Error::AuthenticationFailure(_) => "authentication required",
            Error::MalformedCredential(_) => "malformed credential",
            Error::AlreadyExists(_) => "already exists",
            Error::InvalidInput(_) => "invalid request",
            Error::TransientStore(_) | Error::Io(_) => "service unavailable",
            Error::PageSave { source, .. } => source.boundary_message(),
            Error::PermissionConflict(_)
            | Error::NotFound(_)
            | Error::Crypto(_)
            | Error::Serialization(_) => "internal error",
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_errors_are_retryable() {
        assert!(Error::TransientStore("down".into()).is_retryable());
        assert!(!Error::AuthenticationFailure("bad tag".into()).is_retryable());
        assert!(!Error::PermissionConflict("not owner".into()).is_retryable());
        assert!(!Error::MalformedCredential("no bearer".into()).is_retryable());
    }

    #[test]
    fn test_page_save_retryability_follows_source() {
        let transient = Error::PageSave {
            phase: SavePhase::Populate,
            source: Box::new(Error::TransientStore("timeout".into())),
        };
        assert!(transient.is_retryable());

        let denied = Error::PageSave {
            phase: SavePhase::Provision,
            source: Box::new(Error::AuthenticationFailure("no key".into())),
        };
        assert!(!denied.is_retryable());
        assert!(denied.to_string().contains("provision"));
    }

    #[test]
    fn test_boundary_hides_page_existence() {
        let missing = Error::NotFound("page-7".into());
        let forbidden = Error::PermissionConflict("page-7".into());
        assert_eq!(missing.boundary_message(), forbidden.boundary_message());
    }
}
