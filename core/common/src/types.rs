//! Common types used throughout PageVault.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a user row, assigned by the persistent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a page row, assigned by the persistent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(i64);

impl PageId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored user account.
///
/// All byte fields are opaque to everything outside the crypto and envelope
/// layers. `main_key_encrypted` is `nonce || ciphertext || tag`.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: Vec<u8>,
    /// Master key wrapped under the password-derived key.
    pub main_key_encrypted: Vec<u8>,
    /// Salt for the password-derived key.
    pub encryption_salt: Vec<u8>,
    /// Salt handed to clients for their own password hashing.
    pub auth_salt: Vec<u8>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// A user that has not been persisted yet.
#[derive(Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Vec<u8>,
    pub main_key_encrypted: Vec<u8>,
    pub encryption_salt: Vec<u8>,
    pub auth_salt: Vec<u8>,
}

impl NewUser {
    /// Attach the store-assigned id.
    pub fn into_user(self, id: UserId) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            main_key_encrypted: self.main_key_encrypted,
            encryption_salt: self.encryption_salt,
            auth_salt: self.auth_salt,
        }
    }
}

/// A page. Depending on where it is in the pipeline, `title` and `body` hold
/// plaintext or ciphertext.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// `None` until the store has assigned an id.
    pub id: Option<PageId>,
    pub title: Vec<u8>,
    pub body: Vec<u8>,
    /// `None` for drafts that have not been saved.
    pub owner_id: Option<UserId>,
    pub version: Option<i64>,
}

impl Page {
    /// An unsaved page with plaintext title and body.
    pub fn draft(title: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: None,
            title: title.into(),
            body: body.into(),
            owner_id: None,
            version: None,
        }
    }

    /// The same page with another id.
    pub fn with_id(mut self, id: PageId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Access granted to one user for one page.
#[derive(Clone, PartialEq, Eq)]
pub struct PagePermission {
    pub user_id: UserId,
    pub page_id: PageId,
    pub is_owner: bool,
    pub can_edit: bool,
    /// The page key wrapped under this user's master key.
    pub user_encrypted_page_key: Vec<u8>,
}

impl PagePermission {
    /// Permission row given to the creator of a page.
    pub fn owner(user_id: UserId, page_id: PageId, wrapped_key: Vec<u8>) -> Self {
        Self {
            user_id,
            page_id,
            is_owner: true,
            can_edit: true,
            user_encrypted_page_key: wrapped_key,
        }
    }

    /// Role this row grants.
    pub fn role(&self) -> Role {
        if self.is_owner {
            Role::Owner
        } else if self.can_edit {
            Role::Editor
        } else {
            Role::Viewer
        }
    }
}

impl fmt::Debug for PagePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagePermission")
            .field("user_id", &self.user_id)
            .field("page_id", &self.page_id)
            .field("is_owner", &self.is_owner)
            .field("can_edit", &self.can_edit)
            .finish_non_exhaustive()
    }
}

/// What a permission row allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Editor,
    Viewer,
}

impl Role {
    pub fn can_edit(&self) -> bool {
        matches!(self, Role::Owner | Role::Editor)
    }
}
