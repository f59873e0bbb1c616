//! Key custody for PageVault.
//!
//! This crate provides:
//! - Sessions that cache the password-derived key between requests
//! - Envelope encryption of master keys, page keys and page content
//! - Per-page access control over wrapped page keys
//! - Account signup and sign-in
//!
//! # Architecture
//! Every service borrows one [`KeyCustodyContext`], which owns the cache,
//! the persistent store and the cipher. Only [`Envelope`] ever holds an
//! unwrapped master or page key.

pub mod access;
pub mod accounts;
pub mod config;
pub mod context;
pub mod envelope;
pub mod session;

pub use access::{PageAccess, PageBundle};
pub use accounts::{Accounts, UserSalts};
pub use config::{CustodyConfig, DEFAULT_SESSION_TTL_SECS};
pub use context::KeyCustodyContext;
pub use envelope::Envelope;
pub use session::{AuthStatus, SessionManager, SessionStore, SessionToken, SESSION_COOKIE};
