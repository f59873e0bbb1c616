//! Persistent store trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use pagevault_common::{NewUser, Page, PageId, PagePermission, Result, User, UserId};

/// Persistent store for users, pages and page permissions.
///
/// Rows are opaque: titles, bodies and wrapped keys arrive already encrypted
/// and are stored byte-for-byte.
///
/// Error contract for implementations:
/// - Absent rows are `Error::NotFound`
/// - Unique-constraint violations are `Error::AlreadyExists`
/// - Any I/O or driver failure is `Error::TransientStore`
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Persist a new user in a single step.
    ///
    /// # Errors
    /// - Username or email already taken
    async fn create_user(&self, user: NewUser) -> Result<UserId>;

    /// Get a user by id.
    async fn get_user(&self, id: UserId) -> Result<User>;

    /// Resolve a username to a user id.
    async fn user_id_by_username(&self, username: &str) -> Result<UserId>;

    /// Resolve an email address to a user id.
    async fn user_id_by_email(&self, email: &str) -> Result<UserId>;

    /// Record that a user requested a URL.
    async fn track_activity(&self, user_id: UserId, url: &str, at: DateTime<Utc>) -> Result<()>;

    /// Get a page with its encrypted title and body.
    async fn get_page(&self, id: PageId) -> Result<Page>;

    /// Check whether a page row exists.
    async fn page_exists(&self, id: PageId) -> Result<bool>;

    /// Create an empty page owned by `owner` together with the owner's
    /// permission row.
    ///
    /// # Postconditions
    /// - Both rows exist, or neither does
    /// - Returns the store-assigned page id
    async fn provision_page(&self, owner: UserId, owner_wrapped_key: Vec<u8>) -> Result<PageId>;

    /// Overwrite the title, body and version of an existing page.
    ///
    /// # Errors
    /// - Page has no id or does not exist
    async fn update_page(&self, page: &Page) -> Result<()>;

    /// Delete a page and every permission row that references it.
    ///
    /// # Postconditions
    /// - No permission rows for the page remain, and the page row is gone
    async fn delete_page(&self, id: PageId) -> Result<()>;

    /// Pages the user holds a permission row for, with titles but empty bodies.
    async fn disembodied_pages(&self, user_id: UserId) -> Result<Vec<Page>>;

    /// Get the permission row for a (user, page) pair, if any.
    async fn get_permission(&self, user_id: UserId, page_id: PageId) -> Result<Option<PagePermission>>;
}
