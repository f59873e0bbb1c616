//! SQLite-backed persistent store.
//!
//! Holds users, pages and page permissions in a single database file. Every
//! multi-row change runs in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::store::Store;
use pagevault_common::{Error, NewUser, Page, PageId, PagePermission, Result, User, UserId};

const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash BLOB NOT NULL,
        main_key_encrypted BLOB NOT NULL,
        encryption_salt BLOB NOT NULL,
        auth_salt BLOB NOT NULL
    );

    CREATE TABLE IF NOT EXISTS pages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title BLOB NOT NULL,
        body BLOB NOT NULL,
        owner_id INTEGER NOT NULL REFERENCES users(id),
        version INTEGER
    );

    CREATE TABLE IF NOT EXISTS page_permissions (
        user_id INTEGER NOT NULL REFERENCES users(id),
        page_id INTEGER NOT NULL REFERENCES pages(id),
        is_owner INTEGER NOT NULL,
        can_edit INTEGER NOT NULL,
        user_encrypted_page_key BLOB NOT NULL,
        PRIMARY KEY (user_id, page_id)
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_single_owner
        ON page_permissions(page_id) WHERE is_owner = 1;

    CREATE TABLE IF NOT EXISTS user_activity (
        user_id INTEGER NOT NULL REFERENCES users(id),
        url TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );
"#;

fn store_error(err: rusqlite::Error) -> Error {
    match err {
        rusqlite::Error::QueryReturnedNoRows => Error::NotFound("Row not found".to_string()),
        rusqlite::Error::SqliteFailure(inner, msg)
            if inner.code == ErrorCode::ConstraintViolation
                && (inner.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || inner.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
        {
            Error::AlreadyExists(msg.unwrap_or_else(|| "Unique constraint violated".to_string()))
        }
        other => Error::TransientStore(other.to_string()),
    }
}

fn not_found(what: String) -> impl FnOnce(Error) -> Error {
    move |err| match err {
        Error::NotFound(_) => Error::NotFound(what),
        other => other,
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::new(row.get(0)?),
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        main_key_encrypted: row.get(4)?,
        encryption_salt: row.get(5)?,
        auth_salt: row.get(6)?,
    })
}

/// Persistent store on top of SQLite.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a store database.
    ///
    /// # Errors
    /// - Database creation or migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(store_error)?;
        conn.execute_batch(SCHEMA).map_err(store_error)?;

        info!(path = %db_path.as_ref().display(), "Store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::TransientStore("SQLite connection lock poisoned".to_string()))
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_user(&self, user: NewUser) -> Result<UserId> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO users
            (username, email, password_hash, main_key_encrypted, encryption_salt, auth_salt)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                user.username,
                user.email,
                user.password_hash,
                user.main_key_encrypted,
                user.encryption_salt,
                user.auth_salt,
            ],
        )
        .map_err(store_error)?;

        let id = UserId::new(conn.last_insert_rowid());
        debug!(user_id = %id, "User row created");
        Ok(id)
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()?
            .query_row(
                r#"
                SELECT id, username, email, password_hash, main_key_encrypted,
                       encryption_salt, auth_salt
                FROM users WHERE id = ?1
                "#,
                [id.get()],
                user_from_row,
            )
            .map_err(store_error)
            .map_err(not_found(format!("User not found: {}", id)))
    }

    async fn user_id_by_username(&self, username: &str) -> Result<UserId> {
        self.conn()?
            .query_row("SELECT id FROM users WHERE username = ?1", [username], |row| {
                row.get(0).map(UserId::new)
            })
            .map_err(store_error)
            .map_err(not_found(format!("User not found: {}", username)))
    }

    async fn user_id_by_email(&self, email: &str) -> Result<UserId> {
        self.conn()?
            .query_row("SELECT id FROM users WHERE email = ?1", [email], |row| {
                row.get(0).map(UserId::new)
            })
            .map_err(store_error)
            .map_err(not_found("No user with that email".to_string()))
    }

    async fn track_activity(&self, user_id: UserId, url: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO user_activity (user_id, url, timestamp) VALUES (?1, ?2, ?3)",
                params![user_id.get(), url, at.to_rfc3339()],
            )
            .map_err(store_error)?;
        Ok(())
    }

    async fn get_page(&self, id: PageId) -> Result<Page> {
        self.conn()?
            .query_row(
                "SELECT title, body, owner_id, version FROM pages WHERE id = ?1",
                [id.get()],
                |row| {
                    Ok(Page {
                        id: Some(id),
                        title: row.get(0)?,
                        body: row.get(1)?,
                        owner_id: Some(UserId::new(row.get(2)?)),
                        version: row.get(3)?,
                    })
                },
            )
            .map_err(store_error)
            .map_err(not_found(format!("Page not found: {}", id)))
    }

    async fn page_exists(&self, id: PageId) -> Result<bool> {
        self.conn()?
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM pages WHERE id = ?1)",
                [id.get()],
                |row| row.get(0),
            )
            .map_err(store_error)
    }

    async fn provision_page(&self, owner: UserId, owner_wrapped_key: Vec<u8>) -> Result<PageId> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(store_error)?;

        let owner_exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [owner.get()],
                |row| row.get(0),
            )
            .map_err(store_error)?;
        if !owner_exists {
            return Err(Error::NotFound(format!("User not found: {}", owner)));
        }

        tx.execute(
            "INSERT INTO pages (title, body, owner_id, version) VALUES (x'', x'', ?1, NULL)",
            [owner.get()],
        )
        .map_err(store_error)?;
        let page_id = PageId::new(tx.last_insert_rowid());

        tx.execute(
            r#"
            INSERT INTO page_permissions
            (user_id, page_id, is_owner, can_edit, user_encrypted_page_key)
            VALUES (?1, ?2, 1, 1, ?3)
            "#,
            params![owner.get(), page_id.get(), owner_wrapped_key],
        )
        .map_err(store_error)?;

        tx.commit().map_err(store_error)?;
        debug!(page_id = %page_id, owner = %owner, "Page provisioned");
        Ok(page_id)
    }

    async fn update_page(&self, page: &Page) -> Result<()> {
        let id = page
            .id
            .ok_or_else(|| Error::InvalidInput("Cannot update a page without an id".to_string()))?;

        let changed = self
            .conn()?
            .execute(
                "UPDATE pages SET title = ?1, body = ?2, version = ?3 WHERE id = ?4",
                params![page.title, page.body, page.version, id.get()],
            )
            .map_err(store_error)?;

        if changed == 0 {
            return Err(Error::NotFound(format!("Page not found: {}", id)));
        }
        Ok(())
    }

    async fn delete_page(&self, id: PageId) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(store_error)?;

        tx.execute("DELETE FROM page_permissions WHERE page_id = ?1", [id.get()])
            .map_err(store_error)?;
        let removed = tx
            .execute("DELETE FROM pages WHERE id = ?1", [id.get()])
            .map_err(store_error)?;
        if removed == 0 {
            // Dropping the transaction rolls back.
            return Err(Error::NotFound(format!("Page not found: {}", id)));
        }

        tx.commit().map_err(store_error)?;
        debug!(page_id = %id, "Page deleted");
        Ok(())
    }

    async fn disembodied_pages(&self, user_id: UserId) -> Result<Vec<Page>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT pages.id, pages.title, pages.owner_id, pages.version
                FROM pages JOIN page_permissions ON pages.id = page_permissions.page_id
                WHERE page_permissions.user_id = ?1
                ORDER BY pages.id
                "#,
            )
            .map_err(store_error)?;

        let pages = stmt
            .query_map([user_id.get()], |row| {
                Ok(Page {
                    id: Some(PageId::new(row.get(0)?)),
                    title: row.get(1)?,
                    body: Vec::new(),
                    owner_id: Some(UserId::new(row.get(2)?)),
                    version: row.get(3)?,
                })
            })
            .map_err(store_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_error)?;

        Ok(pages)
    }

    async fn get_permission(&self, user_id: UserId, page_id: PageId) -> Result<Option<PagePermission>> {
        self.conn()?
            .query_row(
                r#"
                SELECT is_owner, can_edit, user_encrypted_page_key
                FROM page_permissions WHERE user_id = ?1 AND page_id = ?2
                "#,
                [user_id.get(), page_id.get()],
                |row| {
                    Ok(PagePermission {
                        user_id,
                        page_id,
                        is_owner: row.get(0)?,
                        can_edit: row.get(1)?,
                        user_encrypted_page_key: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(store_error)
    }
}
