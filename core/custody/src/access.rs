//! Page access control and key custody.
//!
//! Decides, per (user, page) pair, whether a wrapped page key may be fetched
//! and whether the page may be read, edited or deleted. Saving a new page goes
//! through two phases:
//!
//! ```text
//! NotExists ──provision──▶ Provisioned ──populate──▶ Populated
//!                 │                          │
//!                 └─ nothing written         └─ provisioned rows rolled back
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::context::KeyCustodyContext;
use crate::session::SessionStore;
use pagevault_common::{Error, Page, PageId, Result, Role, SavePhase, User, UserId};
use pagevault_crypto::PasswordKey;

/// A stored page and the caller's wrapped page key, encoded for JSON.
///
/// All byte fields are standard base64 of the raw `nonce || ct || tag` records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBundle {
    pub page_id: PageId,
    pub title: String,
    pub body: String,
    pub version: Option<i64>,
    pub role: Role,
    pub user_encrypted_page_key: String,
}

/// Page operations for one context.
pub struct PageAccess<'a> {
    ctx: &'a KeyCustodyContext,
}

impl<'a> PageAccess<'a> {
    pub(crate) fn new(ctx: &'a KeyCustodyContext) -> Self {
        Self { ctx }
    }

    /// Plaintext titles of every page the user holds a permission row for.
    ///
    /// # Errors
    /// - `AuthenticationFailure` if the user has no live session
    pub async fn get_page_titles(&self, user: &User) -> Result<BTreeMap<PageId, Vec<u8>>> {
        let pw_key = self.ctx.sessions().password_key(user.id).await?;
        let store = self.ctx.store();
        let envelope = self.ctx.envelope();

        let mut titles = BTreeMap::new();
        for page in store.disembodied_pages(user.id).await? {
            let Some(page_id) = page.id else { continue };
            let Some(perm) = store.get_permission(user.id, page_id).await? else {
                continue;
            };
            let opened =
                envelope.decrypt_page(&page, &perm.user_encrypted_page_key, user, &pw_key)?;
            titles.insert(page_id, opened.title);
        }

        debug!(user_id = %user.id, count = titles.len(), "Listed page titles");
        Ok(titles)
    }

    /// Whether the user may edit the page. No permission row means no.
    pub async fn check_can_edit(&self, user_id: UserId, page_id: PageId) -> Result<bool> {
        Ok(self
            .ctx
            .store()
            .get_permission(user_id, page_id)
            .await?
            .map(|perm| perm.role().can_edit())
            .unwrap_or(false))
    }

    /// Fetch an encrypted page together with the caller's wrapped page key.
    ///
    /// # Errors
    /// - `NotFound` if the page does not exist
    /// - `PermissionConflict` if the user has no permission row for it
    pub async fn get_page_and_key(&self, page_id: PageId, user_id: UserId) -> Result<(Page, Vec<u8>)> {
        let store = self.ctx.store();
        let page = store.get_page(page_id).await?;
        let perm = store
            .get_permission(user_id, page_id)
            .await?
            .ok_or_else(|| Error::PermissionConflict(format!("No access to page {}", page_id)))?;

        Ok((page, perm.user_encrypted_page_key))
    }

    /// [`get_page_and_key`](Self::get_page_and_key), base64-encoded for transport.
    pub async fn page_bundle(&self, page_id: PageId, user_id: UserId) -> Result<PageBundle> {
        let store = self.ctx.store();
        let page = store.get_page(page_id).await?;
        let perm = store
            .get_permission(user_id, page_id)
            .await?
            .ok_or_else(|| Error::PermissionConflict(format!("No access to page {}", page_id)))?;

        Ok(PageBundle {
            page_id,
            title: STANDARD.encode(&page.title),
            body: STANDARD.encode(&page.body),
            version: page.version,
            role: perm.role(),
            user_encrypted_page_key: STANDARD.encode(&perm.user_encrypted_page_key),
        })
    }

    /// Load a page and decrypt it for the user.
    ///
    /// # Errors
    /// - `NotFound` / `PermissionConflict` as for `get_page_and_key`
    /// - `AuthenticationFailure` if the session key is gone or stale
    pub async fn load_and_decrypt(&self, page_id: PageId, user: &User) -> Result<Page> {
        let (page, wrapped) = self.get_page_and_key(page_id, user.id).await?;
        let pw_key = self.ctx.sessions().password_key(user.id).await?;

        let opened = self
            .ctx
            .envelope()
            .decrypt_page(&page, &wrapped, user, &pw_key)?;

        debug!(page_id = %page_id, user_id = %user.id, "Page decrypted");
        Ok(opened)
    }

    /// Encrypt and persist a plaintext page.
    ///
    /// A page without an id, or whose id is not in the store, is created with
    /// the user as owner. An existing page requires edit rights.
    ///
    /// # Postconditions
    /// - Returns the id the page is stored under
    /// - A new page either has its owner permission row and encrypted content,
    ///   or nothing of it remains in the store
    ///
    /// # Errors
    /// - `PermissionConflict` if the user may not edit an existing page
    /// - `PageSave { phase, .. }` if creating a new page failed part way
    pub async fn save_page(&self, page: &Page, user: &User) -> Result<PageId> {
        let pw_key = self.ctx.sessions().password_key(user.id).await?;
        let store = self.ctx.store();

        let existing = match page.id {
            Some(id) if store.page_exists(id).await? => Some(id),
            _ => None,
        };

        let Some(page_id) = existing else {
            return self.create_page(page, user, &pw_key).await;
        };

        let perm = store
            .get_permission(user.id, page_id)
            .await?
            .filter(|perm| perm.role().can_edit())
            .ok_or_else(|| {
                Error::PermissionConflict(format!("User {} may not edit page {}", user.id, page_id))
            })?;

        let sealed = self.ctx.envelope().encrypt_page(
            &page.clone().with_id(page_id),
            &perm.user_encrypted_page_key,
            user,
            &pw_key,
        )?;
        store.update_page(&sealed).await?;

        info!(page_id = %page_id, user_id = %user.id, "Page updated");
        Ok(page_id)
    }

    async fn create_page(&self, page: &Page, user: &User, pw_key: &PasswordKey) -> Result<PageId> {
        let store = self.ctx.store();
        let envelope = self.ctx.envelope();
        let provision_failed = |source: Error| Error::PageSave {
            phase: SavePhase::Provision,
            source: Box::new(source),
        };

        let wrapped = envelope
            .new_user_wrapped_symmetric_key(user, pw_key)
            .map_err(provision_failed)?;
        let page_id = store
            .provision_page(user.id, wrapped.clone())
            .await
            .map_err(provision_failed)?;

        let draft = Page {
            id: Some(page_id),
            owner_id: Some(user.id),
            ..page.clone()
        };
        let populated = match envelope.encrypt_page(&draft, &wrapped, user, pw_key) {
            Ok(sealed) => store.update_page(&sealed).await,
            Err(e) => Err(e),
        };

        if let Err(source) = populated {
            if let Err(rollback) = store.delete_page(page_id).await {
                warn!(page_id = %page_id, error = %rollback, "Rollback of provisioned page failed");
            }
            return Err(Error::PageSave {
                phase: SavePhase::Populate,
                source: Box::new(source),
            });
        }

        info!(page_id = %page_id, user_id = %user.id, "Page created");
        Ok(page_id)
    }

    /// Delete a page. Only its owner may.
    ///
    /// # Postconditions
    /// - No permission rows for the page remain, and the page row is gone
    pub async fn delete_page(&self, page_id: PageId, user_id: UserId) -> Result<()> {
        let store = self.ctx.store();
        let page = store.get_page(page_id).await?;

        if page.owner_id != Some(user_id) {
            return Err(Error::PermissionConflict(format!(
                "User {} does not own page {}",
                user_id, page_id
            )));
        }

        store.delete_page(page_id).await?;
        info!(page_id = %page_id, user_id = %user_id, "Page deleted");
        Ok(())
    }
}
