//! Common utilities and types shared across PageVault modules.
//!
//! This module provides the error taxonomy and the domain records (users,
//! pages, permissions) that every other crate passes around.

pub mod error;
pub mod types;

pub use error::{Error, Result, SavePhase};
pub use types::{NewUser, Page, PageId, PagePermission, Role, User, UserId};
