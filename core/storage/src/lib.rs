//! Storage abstractions for PageVault.
//!
//! Two trait seams back the key custody layer:
//! - [`Store`]: durable rows for users, pages and page permissions
//! - [`Cache`]: short-lived secrets (session tokens, counters, derived keys)
//!
//! Both are async and backend-agnostic. In-memory implementations serve tests
//! and single-process use; [`SqliteStore`] persists to a database file.

pub mod cache;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use cache::{Cache, CacheValue};
pub use memory::{ActivityRecord, MemoryCache, MemoryStore};
pub use sqlite::SqliteStore;
pub use store::Store;
