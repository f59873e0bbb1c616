//! Envelope encryption for master keys and page keys.
//!
//! Key hierarchy:
//! ```text
//! Password + encryption salt
//!         ↓ PBKDF2
//!    Password key (cached per session)
//!         ↓ wraps
//!    Master key (User::main_key_encrypted)
//!         ↓ wraps
//!    Page key (PagePermission::user_encrypted_page_key)
//!         ↓ encrypts
//!    Title, body
//! ```
//!
//! Unwrapped master and page keys live only for the duration of one call.
//! The master key is re-unwrapped every time.

use zeroize::Zeroizing;

use crate::context::KeyCustodyContext;
use pagevault_common::{Page, Result, User};
use pagevault_crypto::{PasswordKey, SymmetricKey};

/// Wraps and unwraps keys and page content for one context.
pub struct Envelope<'a> {
    ctx: &'a KeyCustodyContext,
}

impl<'a> Envelope<'a> {
    pub(crate) fn new(ctx: &'a KeyCustodyContext) -> Self {
        Self { ctx }
    }

    fn open_key(&self, wrapped: &[u8], key: &[u8]) -> Result<SymmetricKey> {
        let plaintext = Zeroizing::new(self.ctx.cipher().decrypt(wrapped, key)?);
        SymmetricKey::from_slice(&plaintext)
    }

    /// Recover the user's master key.
    ///
    /// # Errors
    /// - `AuthenticationFailure` if `pw_key` is stale or wrong
    pub(crate) fn unwrap_user_master_key(
        &self,
        user: &User,
        pw_key: &PasswordKey,
    ) -> Result<SymmetricKey> {
        self.open_key(&user.main_key_encrypted, pw_key.as_bytes())
    }

    fn unwrap_page_key(
        &self,
        user: &User,
        wrapped_page_key: &[u8],
        pw_key: &PasswordKey,
    ) -> Result<SymmetricKey> {
        let master = self.unwrap_user_master_key(user, pw_key)?;
        self.open_key(wrapped_page_key, master.as_bytes())
    }

    /// Wrap `plaintext_key` under the user's master key.
    pub fn wrap_user_key(
        &self,
        user: &User,
        plaintext_key: &SymmetricKey,
        pw_key: &PasswordKey,
    ) -> Result<Vec<u8>> {
        let master = self.unwrap_user_master_key(user, pw_key)?;
        self.ctx
            .cipher()
            .encrypt(plaintext_key.as_bytes(), master.as_bytes())
    }

    /// Encrypt title and body of a plaintext page.
    ///
    /// # Postconditions
    /// - Title and body are sealed independently, each with its own nonce
    /// - Id, owner and version are carried over unchanged
    pub fn encrypt_page(
        &self,
        page: &Page,
        wrapped_page_key: &[u8],
        user: &User,
        pw_key: &PasswordKey,
    ) -> Result<Page> {
        let page_key = self.unwrap_page_key(user, wrapped_page_key, pw_key)?;
        let cipher = self.ctx.cipher();

        Ok(Page {
            title: cipher.encrypt(&page.title, page_key.as_bytes())?,
            body: cipher.encrypt(&page.body, page_key.as_bytes())?,
            ..page.clone()
        })
    }

    /// Decrypt title and body of a stored page.
    ///
    /// A zero-length field means "not loaded" (e.g. the body of a title-only
    /// listing) and stays zero-length.
    pub fn decrypt_page(
        &self,
        page: &Page,
        wrapped_page_key: &[u8],
        user: &User,
        pw_key: &PasswordKey,
    ) -> Result<Page> {
        let page_key = self.unwrap_page_key(user, wrapped_page_key, pw_key)?;
        let cipher = self.ctx.cipher();

        let open = |field: &[u8]| -> Result<Vec<u8>> {
            if field.is_empty() {
                Ok(Vec::new())
            } else {
                cipher.decrypt(field, page_key.as_bytes())
            }
        };

        Ok(Page {
            title: open(&page.title)?,
            body: open(&page.body)?,
            ..page.clone()
        })
    }

    /// Mint a fresh page key and return it wrapped under the user's master key.
    ///
    /// The plaintext key never leaves this call.
    pub fn new_user_wrapped_symmetric_key(&self, user: &User, pw_key: &PasswordKey) -> Result<Vec<u8>> {
        let page_key = SymmetricKey::generate()?;
        self.wrap_user_key(user, &page_key, pw_key)
    }

    /// Mint a fresh master key and return it wrapped under `pw_key`.
    pub fn new_wrapped_master_key(&self, pw_key: &PasswordKey) -> Result<Vec<u8>> {
        let master = SymmetricKey::generate()?;
        self.ctx
            .cipher()
            .encrypt(master.as_bytes(), pw_key.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_context, user_with_key};
    use pagevault_common::Error;
    use pagevault_crypto::KEY_LENGTH;

    #[test]
    fn test_master_key_roundtrip() {
        let ctx = memory_context();
        let (user, pw_key) = user_with_key(&ctx);

        let a = ctx.envelope().unwrap_user_master_key(&user, &pw_key).unwrap();
        let b = ctx.envelope().unwrap_user_master_key(&user, &pw_key).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_wrong_password_key_fails_closed() {
        let ctx = memory_context();
        let (user, _) = user_with_key(&ctx);
        let stale = PasswordKey::from_bytes([7u8; KEY_LENGTH]);

        let result = ctx.envelope().unwrap_user_master_key(&user, &stale);
        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
    }

    #[test]
    fn test_page_encrypt_decrypt() {
        let ctx = memory_context();
        let (user, pw_key) = user_with_key(&ctx);
        let envelope = ctx.envelope();
        let wrapped = envelope.new_user_wrapped_symmetric_key(&user, &pw_key).unwrap();

        let page = Page::draft("Hello", "World");
        let sealed = envelope.encrypt_page(&page, &wrapped, &user, &pw_key).unwrap();
        assert_ne!(sealed.title, b"Hello");
        assert_eq!(sealed.title.len(), 5 + 28);

        let opened = envelope.decrypt_page(&sealed, &wrapped, &user, &pw_key).unwrap();
        assert_eq!(opened, page);
    }

    #[test]
    fn test_empty_fields_skip_decrypt() {
        let ctx = memory_context();
        let (user, pw_key) = user_with_key(&ctx);
        let envelope = ctx.envelope();
        let wrapped = envelope.new_user_wrapped_symmetric_key(&user, &pw_key).unwrap();

        let sealed = envelope
            .encrypt_page(&Page::draft("Title only", ""), &wrapped, &user, &pw_key)
            .unwrap();
        let disembodied = Page {
            body: Vec::new(),
            ..sealed
        };

        let opened = envelope
            .decrypt_page(&disembodied, &wrapped, &user, &pw_key)
            .unwrap();
        assert_eq!(opened.title, b"Title only");
        assert!(opened.body.is_empty());
    }

    #[test]
    fn test_page_key_from_another_user_rejected() {
        let ctx = memory_context();
        let (alice, alice_key) = user_with_key(&ctx);
        let (bob, bob_key) = user_with_key(&ctx);
        let envelope = ctx.envelope();

        let wrapped_for_alice = envelope
            .new_user_wrapped_symmetric_key(&alice, &alice_key)
            .unwrap();
        let sealed = envelope
            .encrypt_page(&Page::draft("t", "b"), &wrapped_for_alice, &alice, &alice_key)
            .unwrap();

        let result = envelope.decrypt_page(&sealed, &wrapped_for_alice, &bob, &bob_key);
        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
    }

    #[test]
    fn test_wrapped_keys_are_fresh() {
        let ctx = memory_context();
        let (user, pw_key) = user_with_key(&ctx);
        let envelope = ctx.envelope();

        let a = envelope.new_user_wrapped_symmetric_key(&user, &pw_key).unwrap();
        let b = envelope.new_user_wrapped_symmetric_key(&user, &pw_key).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), KEY_LENGTH + 28);
    }
}
