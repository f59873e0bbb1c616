//! In-memory store and cache for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use zeroize::Zeroize;

use crate::cache::{Cache, CacheValue};
use crate::store::Store;
use pagevault_common::{Error, NewUser, Page, PageId, PagePermission, Result, User, UserId};

fn poisoned() -> Error {
    Error::TransientStore("In-memory lock poisoned".to_string())
}

/// One row of the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub user_id: UserId,
    pub url: String,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    last_user_id: i64,
    last_page_id: i64,
    users: HashMap<UserId, User>,
    pages: HashMap<PageId, Page>,
    permissions: HashMap<(UserId, PageId), PagePermission>,
    activity: Vec<ActivityRecord>,
}

/// In-memory persistent store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Ids start at 1, like an auto-increment column.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| poisoned())
    }

    /// Snapshot of the activity log.
    pub fn activity(&self) -> Result<Vec<ActivityRecord>> {
        Ok(self.read()?.activity.clone())
    }

    /// Number of permission rows that reference a page.
    pub fn permission_count(&self, page_id: PageId) -> Result<usize> {
        Ok(self
            .read()?
            .permissions
            .keys()
            .filter(|(_, p)| *p == page_id)
            .count())
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_user(&self, user: NewUser) -> Result<UserId> {
        let mut tables = self.write()?;

        if tables.users.values().any(|u| u.username == user.username) {
            return Err(Error::AlreadyExists(format!(
                "Username '{}' is taken",
                user.username
            )));
        }
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(Error::AlreadyExists("Email is already registered".to_string()));
        }

        tables.last_user_id += 1;
        let id = UserId::new(tables.last_user_id);
        tables.users.insert(id, user.into_user(id));
        Ok(id)
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        self.read()?
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", id)))
    }

    async fn user_id_by_username(&self, username: &str) -> Result<UserId> {
        self.read()?
            .users
            .values()
            .find(|u| u.username == username)
            .map(|u| u.id)
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", username)))
    }

    async fn user_id_by_email(&self, email: &str) -> Result<UserId> {
        self.read()?
            .users
            .values()
            .find(|u| u.email == email)
            .map(|u| u.id)
            .ok_or_else(|| Error::NotFound("No user with that email".to_string()))
    }

    async fn track_activity(&self, user_id: UserId, url: &str, at: DateTime<Utc>) -> Result<()> {
        self.write()?.activity.push(ActivityRecord {
            user_id,
            url: url.to_string(),
            at,
        });
        Ok(())
    }

    async fn get_page(&self, id: PageId) -> Result<Page> {
        self.read()?
            .pages
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Page not found: {}", id)))
    }

    async fn page_exists(&self, id: PageId) -> Result<bool> {
        Ok(self.read()?.pages.contains_key(&id))
    }

    async fn provision_page(&self, owner: UserId, owner_wrapped_key: Vec<u8>) -> Result<PageId> {
        let mut tables = self.write()?;

        if !tables.users.contains_key(&owner) {
            return Err(Error::NotFound(format!("User not found: {}", owner)));
        }

        tables.last_page_id += 1;
        let id = PageId::new(tables.last_page_id);
        tables.pages.insert(
            id,
            Page {
                id: Some(id),
                title: Vec::new(),
                body: Vec::new(),
                owner_id: Some(owner),
                version: None,
            },
        );
        tables
            .permissions
            .insert((owner, id), PagePermission::owner(owner, id, owner_wrapped_key));
        Ok(id)
    }

    async fn update_page(&self, page: &Page) -> Result<()> {
        let id = page
            .id
            .ok_or_else(|| Error::InvalidInput("Cannot update a page without an id".to_string()))?;
        let mut tables = self.write()?;

        let stored = tables
            .pages
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Page not found: {}", id)))?;
        stored.title = page.title.clone();
        stored.body = page.body.clone();
        stored.version = page.version;
        Ok(())
    }

    async fn delete_page(&self, id: PageId) -> Result<()> {
        let mut tables = self.write()?;

        if !tables.pages.contains_key(&id) {
            return Err(Error::NotFound(format!("Page not found: {}", id)));
        }
        tables.permissions.retain(|(_, page_id), _| *page_id != id);
        tables.pages.remove(&id);
        Ok(())
    }

    async fn disembodied_pages(&self, user_id: UserId) -> Result<Vec<Page>> {
        let tables = self.read()?;

        let mut pages: Vec<Page> = tables
            .permissions
            .keys()
            .filter(|(u, _)| *u == user_id)
            .filter_map(|(_, page_id)| tables.pages.get(page_id))
            .map(|page| Page {
                body: Vec::new(),
                ..page.clone()
            })
            .collect();
        pages.sort_by_key(|p| p.id);
        Ok(pages)
    }

    async fn get_permission(&self, user_id: UserId, page_id: PageId) -> Result<Option<PagePermission>> {
        Ok(self.read()?.permissions.get(&(user_id, page_id)).cloned())
    }
}

struct CacheEntry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }

    fn wipe(&mut self) {
        if let CacheValue::Bytes(bytes) = &mut self.value {
            bytes.zeroize();
        }
    }
}

/// In-memory cache with lazy expiry.
///
/// Expired entries are invisible to reads and are wiped the next time the
/// cache is written to.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> Result<usize> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|e| e.is_live(now))
            .count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn insert(&self, key: &str, value: CacheValue, expires_at: Option<Instant>) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        entries.retain(|_, entry| {
            let live = entry.is_live(now);
            if !live {
                entry.wipe();
            }
            live
        });

        if let Some(mut old) = entries.insert(key.to_string(), CacheEntry { value, expires_at }) {
            old.wipe();
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: CacheValue) -> Result<()> {
        self.insert(key, value, None)
    }

    async fn set_ex(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<()> {
        self.insert(key, value, Some(Instant::now() + ttl))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if let Some(mut old) = entries.remove(key) {
            old.wipe();
        }
        Ok(())
    }
}
