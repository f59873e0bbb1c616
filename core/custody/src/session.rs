//! Session management.
//!
//! A session is three cache entries, all bounded by the same TTL:
//! - `session_<token>` → user id
//! - `pgkey_<user_id>` → password-derived key
//! - `n_sessions_<user_id>` → number of live sessions
//!
//! The password key is shared by every session of a user and is evicted when
//! the last one ends, so it never outlives all of that user's tokens.

use async_trait::async_trait;
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::context::{run_blocking, KeyCustodyContext};
use pagevault_common::{Error, Result, User, UserId};
use pagevault_crypto::{derive_key, verify_password, PasswordKey, Salt};
use pagevault_storage::CacheValue;

/// Cookie that carries the session token.
pub const SESSION_COOKIE: &str = "session_token";

const BEARER_PREFIX: &str = "Bearer ";

/// Cache key for a token. Only well-formed UUIDs have one, so a client cannot
/// name another entry (`pgkey_*`, `n_sessions_*`) as its token.
fn session_entry(token: &str) -> Option<String> {
    Uuid::parse_str(token)
        .ok()
        .map(|id| format!("session_{}", id.hyphenated()))
}

fn password_key_entry(user_id: UserId) -> String {
    format!("pgkey_{}", user_id)
}

fn session_count_entry(user_id: UserId) -> String {
    format!("n_sessions_{}", user_id)
}

/// Opaque session token handed to the client.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Mint a new random token.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken([REDACTED])")
    }
}

/// Outcome of a credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Authenticated(UserId),
    Anonymous,
}

impl AuthStatus {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            AuthStatus::Authenticated(id) => Some(*id),
            AuthStatus::Anonymous => None,
        }
    }
}

/// Source of the cached password-derived key.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the password key of a user with a live session.
    ///
    /// # Errors
    /// - `AuthenticationFailure` if no session holds a key for the user
    async fn password_key(&self, user_id: UserId) -> Result<PasswordKey>;
}

/// Issues, checks and ends sessions.
pub struct SessionManager<'a> {
    ctx: &'a KeyCustodyContext,
}

impl<'a> SessionManager<'a> {
    pub(crate) fn new(ctx: &'a KeyCustodyContext) -> Self {
        Self { ctx }
    }

    /// Start a session for a user who presents their password.
    ///
    /// # Postconditions
    /// - Token resolves to `user.id` for the session TTL
    /// - `pgkey_<id>` holds the password-derived key with the same TTL
    /// - The user's session count is one higher (1 if it was absent)
    ///
    /// # Errors
    /// - `AuthenticationFailure` if the password does not match
    /// - `TransientStore` if the cache is unavailable
    pub async fn begin_session(&self, user: &User, password: &[u8]) -> Result<SessionToken> {
        let password = Zeroizing::new(password.to_vec());
        let cache = self.ctx.cache();
        let ttl = self.ctx.session_ttl();

        {
            let hash = user.password_hash.clone();
            let password = password.clone();
            run_blocking(move || verify_password(&hash, &password)).await?;
        }

        let salt = Salt::from_slice(&user.encryption_salt)?;
        let params = self.ctx.kdf_params();
        let pw_key = run_blocking(move || derive_key(&password, &salt, &params)).await?;

        let token = SessionToken::new();
        let token_entry = session_entry(token.as_str())
            .ok_or_else(|| Error::Crypto("Minted token is not a UUID".to_string()))?;
        cache
            .set_ex(&token_entry, CacheValue::Int(user.id.get()), ttl)
            .await?;
        cache
            .set_ex(
                &password_key_entry(user.id),
                CacheValue::Bytes(pw_key.as_bytes().to_vec()),
                ttl,
            )
            .await?;

        let count_key = session_count_entry(user.id);
        let count = cache.get_int(&count_key).await?.unwrap_or(0) + 1;
        cache.set_ex(&count_key, CacheValue::Int(count), ttl).await?;

        info!(user_id = %user.id, sessions = count, "Session started");
        Ok(token)
    }

    /// Resolve a token to a user.
    ///
    /// Unknown, expired and malformed tokens are anonymous, not errors.
    pub async fn check_status(&self, token: &str) -> Result<AuthStatus> {
        let Some(entry) = session_entry(token) else {
            return Ok(AuthStatus::Anonymous);
        };

        match self.ctx.cache().get_int(&entry).await? {
            Some(id) => Ok(AuthStatus::Authenticated(UserId::new(id))),
            None => Ok(AuthStatus::Anonymous),
        }
    }

    /// Check an `Authorization: Bearer <token>` header value.
    ///
    /// # Errors
    /// - `MalformedCredential` if the value is not `Bearer <uuid>`
    pub async fn check_bearer(&self, header: &str) -> Result<AuthStatus> {
        let token = header
            .strip_prefix(BEARER_PREFIX)
            .map(str::trim)
            .filter(|t| session_entry(t).is_some())
            .ok_or_else(|| {
                Error::MalformedCredential("Expected 'Bearer <token>'".to_string())
            })?;

        self.check_status(token).await
    }

    /// Check the `session_token` entry of a `Cookie` header value.
    ///
    /// A header without that cookie is anonymous.
    pub async fn check_cookie(&self, header: &str) -> Result<AuthStatus> {
        match session_cookie(header) {
            Some(token) => self.check_status(token).await,
            None => Ok(AuthStatus::Anonymous),
        }
    }

    /// End one session of a user.
    ///
    /// # Postconditions
    /// - The token no longer resolves
    /// - When this was the user's last session, `pgkey_<id>` is gone
    ///
    /// # Errors
    /// - `PermissionConflict` if the token belongs to another user
    pub async fn end_session(&self, user_id: UserId, token: &str) -> Result<()> {
        let cache = self.ctx.cache();
        let Some(token_entry) = session_entry(token) else {
            debug!(user_id = %user_id, "Malformed token, nothing to end");
            return Ok(());
        };

        match cache.get_int(&token_entry).await? {
            None => {
                debug!(user_id = %user_id, "Token already gone");
                return Ok(());
            }
            Some(owner) if owner != user_id.get() => {
                return Err(Error::PermissionConflict(
                    "Token belongs to another user".to_string(),
                ));
            }
            Some(_) => {}
        }
        cache.delete(&token_entry).await?;

        let count_key = session_count_entry(user_id);
        let key_entry = password_key_entry(user_id);
        match cache.get_int(&count_key).await {
            Ok(Some(count)) if count > 1 => {
                cache
                    .set_ex(&count_key, CacheValue::Int(count - 1), self.ctx.session_ttl())
                    .await?;
                info!(user_id = %user_id, sessions = count - 1, "Session ended");
            }
            Ok(Some(_)) => {
                cache
                    .set_ex(&count_key, CacheValue::Int(0), self.ctx.session_ttl())
                    .await?;
                cache.delete(&key_entry).await?;
                info!(user_id = %user_id, "Last session ended, password key evicted");
            }
            Ok(None) => {
                cache.delete(&key_entry).await?;
                info!(user_id = %user_id, "Session count missing, password key evicted");
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Session count unreadable, evicting password key");
                cache.delete(&key_entry).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<'a> SessionStore for SessionManager<'a> {
    async fn password_key(&self, user_id: UserId) -> Result<PasswordKey> {
        let bytes = self
            .ctx
            .cache()
            .get_bytes(&password_key_entry(user_id))
            .await?
            .map(Zeroizing::new)
            .ok_or_else(|| Error::AuthenticationFailure("No active session".to_string()))?;

        PasswordKey::from_slice(&bytes)
    }
}

fn session_cookie(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_with, memory_context, signup};
    use pagevault_storage::{MemoryCache, MemoryStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_begin_and_check() {
        let ctx = memory_context();
        let user = signup(&ctx, "alice", "correcthorse").await;
        let sessions = ctx.sessions();

        let token = sessions.begin_session(&user, b"correcthorse").await.unwrap();
        assert_eq!(
            sessions.check_status(token.as_str()).await.unwrap(),
            AuthStatus::Authenticated(user.id)
        );
        assert!(sessions.password_key(user.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_password_creates_nothing() {
        let ctx = memory_context();
        let user = signup(&ctx, "alice", "correcthorse").await;

        let result = ctx.sessions().begin_session(&user, b"wrong").await;
        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
        assert!(matches!(
            ctx.sessions().password_key(user.id).await,
            Err(Error::AuthenticationFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_token_is_anonymous() {
        let ctx = memory_context();
        let sessions = ctx.sessions();

        assert_eq!(
            sessions.check_status("no-such-token").await.unwrap(),
            AuthStatus::Anonymous
        );
        assert_eq!(sessions.check_status("").await.unwrap(), AuthStatus::Anonymous);
    }

    #[tokio::test]
    async fn test_bearer_header() {
        let ctx = memory_context();
        let user = signup(&ctx, "alice", "correcthorse").await;
        let sessions = ctx.sessions();
        let token = sessions.begin_session(&user, b"correcthorse").await.unwrap();

        let header = format!("Bearer {}", token.as_str());
        assert_eq!(
            sessions.check_bearer(&header).await.unwrap().user_id(),
            Some(user.id)
        );

        for bad in ["", "Bearer", "Bearer ", "Basic abc", "bearer abc", "Bearer a b"] {
            assert!(
                matches!(
                    sessions.check_bearer(bad).await,
                    Err(Error::MalformedCredential(_))
                ),
                "accepted {:?}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_cookie_header() {
        let ctx = memory_context();
        let user = signup(&ctx, "alice", "correcthorse").await;
        let sessions = ctx.sessions();
        let token = sessions.begin_session(&user, b"correcthorse").await.unwrap();

        let header = format!("theme=dark; session_token={}; lang=en", token.as_str());
        assert_eq!(
            sessions.check_cookie(&header).await.unwrap(),
            AuthStatus::Authenticated(user.id)
        );
        assert_eq!(
            sessions.check_cookie("theme=dark").await.unwrap(),
            AuthStatus::Anonymous
        );
    }

    #[tokio::test]
    async fn test_key_survives_until_last_session_ends() {
        let ctx = memory_context();
        let user = signup(&ctx, "alice", "correcthorse").await;
        let sessions = ctx.sessions();

        let first = sessions.begin_session(&user, b"correcthorse").await.unwrap();
        let second = sessions.begin_session(&user, b"correcthorse").await.unwrap();
        assert_ne!(first, second);

        sessions.end_session(user.id, first.as_str()).await.unwrap();
        assert_eq!(
            sessions.check_status(first.as_str()).await.unwrap(),
            AuthStatus::Anonymous
        );
        assert!(sessions.password_key(user.id).await.is_ok());

        sessions.end_session(user.id, second.as_str()).await.unwrap();
        assert!(matches!(
            sessions.password_key(user.id).await,
            Err(Error::AuthenticationFailure(_))
        ));
        assert_eq!(
            ctx.cache()
                .get_int(&session_count_entry(user.id))
                .await
                .unwrap(),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_missing_counter_evicts_key() {
        let ctx = memory_context();
        let user = signup(&ctx, "alice", "correcthorse").await;
        let sessions = ctx.sessions();

        let a = sessions.begin_session(&user, b"correcthorse").await.unwrap();
        sessions.begin_session(&user, b"correcthorse").await.unwrap();
        ctx.cache().delete(&session_count_entry(user.id)).await.unwrap();

        sessions.end_session(user.id, a.as_str()).await.unwrap();
        assert!(sessions.password_key(user.id).await.is_err());
    }

    #[tokio::test]
    async fn test_unreadable_counter_evicts_key() {
        let ctx = memory_context();
        let user = signup(&ctx, "alice", "correcthorse").await;
        let sessions = ctx.sessions();

        let token = sessions.begin_session(&user, b"correcthorse").await.unwrap();
        ctx.cache()
            .set(&session_count_entry(user.id), CacheValue::Bytes(b"garbage".to_vec()))
            .await
            .unwrap();

        sessions.end_session(user.id, token.as_str()).await.unwrap();
        assert!(sessions.password_key(user.id).await.is_err());
    }

    #[tokio::test]
    async fn test_end_session_of_another_user_rejected() {
        let ctx = memory_context();
        let alice = signup(&ctx, "alice", "correcthorse").await;
        let bob = signup(&ctx, "bob", "batterystaple").await;
        let sessions = ctx.sessions();

        let token = sessions.begin_session(&alice, b"correcthorse").await.unwrap();
        let result = sessions.end_session(bob.id, token.as_str()).await;

        assert!(matches!(result, Err(Error::PermissionConflict(_))));
        assert_eq!(
            sessions.check_status(token.as_str()).await.unwrap(),
            AuthStatus::Authenticated(alice.id)
        );
    }

    #[tokio::test]
    async fn test_end_unknown_session_is_noop() {
        let ctx = memory_context();
        let user = signup(&ctx, "alice", "correcthorse").await;

        let never_issued = SessionToken::new();
        assert!(ctx
            .sessions()
            .end_session(user.id, never_issued.as_str())
            .await
            .is_ok());
        assert!(ctx.sessions().end_session(user.id, "gone").await.is_ok());
    }

    #[tokio::test]
    async fn test_internal_entries_are_not_tokens() {
        let ctx = memory_context();
        let alice = signup(&ctx, "alice", "correcthorse").await;
        let bob = signup(&ctx, "bob", "batterystaple").await;
        let sessions = ctx.sessions();
        sessions.begin_session(&bob, b"batterystaple").await.unwrap();

        // bob's counter holds 1, which is alice's id.
        let counter = session_count_entry(bob.id);
        let key = password_key_entry(bob.id);
        assert_eq!(ctx.cache().get_int(&counter).await.unwrap(), Some(alice.id.get()));

        for forged in [counter.as_str(), key.as_str()] {
            assert_eq!(
                sessions.check_status(forged).await.unwrap(),
                AuthStatus::Anonymous
            );
            assert_eq!(
                sessions
                    .check_cookie(&format!("session_token={}", forged))
                    .await
                    .unwrap(),
                AuthStatus::Anonymous
            );
            assert!(matches!(
                sessions.check_bearer(&format!("Bearer {}", forged)).await,
                Err(Error::MalformedCredential(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_end_session_cannot_touch_internal_entries() {
        let ctx = memory_context();
        let alice = signup(&ctx, "alice", "correcthorse").await;
        let bob = signup(&ctx, "bob", "batterystaple").await;
        let sessions = ctx.sessions();
        sessions.begin_session(&bob, b"batterystaple").await.unwrap();

        let counter = session_count_entry(bob.id);
        sessions.end_session(alice.id, &counter).await.unwrap();
        sessions
            .end_session(alice.id, &password_key_entry(bob.id))
            .await
            .unwrap();

        assert_eq!(ctx.cache().get_int(&counter).await.unwrap(), Some(1));
        assert!(sessions.password_key(bob.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_derivation_leaves_no_token() {
        let cache = Arc::new(MemoryCache::new());
        let ctx = context_with(Arc::new(MemoryStore::new()), cache.clone());
        let mut user = signup(&ctx, "alice", "correcthorse").await;
        user.encryption_salt.truncate(3);

        let result = ctx.sessions().begin_session(&user, b"correcthorse").await;
        assert!(matches!(result, Err(Error::Crypto(_))));
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_token_debug_redacted() {
        let token = SessionToken::new();
        assert!(!format!("{:?}", token).contains(token.as_str()));
    }
}
