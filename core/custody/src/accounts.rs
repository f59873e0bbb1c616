//! User accounts: signup, lookup, sign-in and activity tracking.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::context::{run_blocking, KeyCustodyContext};
use crate::session::SessionToken;
use pagevault_common::{Error, NewUser, Result, User, UserId};
use pagevault_crypto::{derive_key, hash_password, Salt};

const UNKNOWN_CREDENTIALS: &str = "Invalid username or password";

/// Run one Argon2 pass for a username that does not exist, so a miss costs
/// as much as a wrong password.
async fn equalize_password_work(password: &[u8]) {
    let password = Zeroizing::new(password.to_vec());
    if let Err(e) = run_blocking(move || hash_password(&password)).await {
        warn!(error = %e, "Dummy password hash failed");
    }
}

/// A user's public salts, base64-encoded for clients that derive keys
/// themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSalts {
    pub encryption_salt: String,
    pub auth_salt: String,
}

/// Account operations for one context.
pub struct Accounts<'a> {
    ctx: &'a KeyCustodyContext,
}

impl<'a> Accounts<'a> {
    pub(crate) fn new(ctx: &'a KeyCustodyContext) -> Self {
        Self { ctx }
    }

    /// Create a user with a fresh key hierarchy.
    ///
    /// # Postconditions
    /// - Both salts, the password hash and the wrapped master key are
    ///   persisted in one store call, or nothing is
    ///
    /// # Errors
    /// - `InvalidInput` on an empty username, email or password
    /// - `AlreadyExists` if the username or email is taken
    pub async fn signup(&self, username: &str, email: &str, password: &[u8]) -> Result<User> {
        if username.is_empty() || email.is_empty() || password.is_empty() {
            return Err(Error::InvalidInput(
                "Username, email and password are required".to_string(),
            ));
        }

        let encryption_salt = Salt::generate()?;
        let auth_salt = Salt::generate()?;
        let password = Zeroizing::new(password.to_vec());

        let password_hash = {
            let password = password.clone();
            run_blocking(move || hash_password(&password)).await?
        };

        let params = self.ctx.kdf_params();
        let salt = encryption_salt.clone();
        let pw_key = run_blocking(move || derive_key(&password, &salt, &params)).await?;
        let main_key_encrypted = self.ctx.envelope().new_wrapped_master_key(&pw_key)?;

        let new_user = NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.into_bytes(),
            main_key_encrypted,
            encryption_salt: encryption_salt.to_vec(),
            auth_salt: auth_salt.to_vec(),
        };
        let id = self.ctx.store().create_user(new_user.clone()).await?;

        info!(user_id = %id, "User signed up");
        Ok(new_user.into_user(id))
    }

    pub async fn get_by_id(&self, id: UserId) -> Result<User> {
        self.ctx.store().get_user(id).await
    }

    pub async fn get_by_username(&self, username: &str) -> Result<User> {
        let id = self.ctx.store().user_id_by_username(username).await?;
        self.get_by_id(id).await
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User> {
        let id = self.ctx.store().user_id_by_email(email).await?;
        self.get_by_id(id).await
    }

    /// Look up a user by name and start a session.
    ///
    /// Unknown usernames fail the same way as wrong passwords.
    pub async fn sign_in(&self, username: &str, password: &[u8]) -> Result<(User, SessionToken)> {
        let user = match self.get_by_username(username).await {
            Ok(user) => user,
            Err(Error::NotFound(_)) => {
                equalize_password_work(password).await;
                return Err(Error::AuthenticationFailure(
                    UNKNOWN_CREDENTIALS.to_string(),
                ));
            }
            Err(e) => return Err(e),
        };

        let token = self
            .ctx
            .sessions()
            .begin_session(&user, password)
            .await
            .map_err(|e| match e {
                Error::AuthenticationFailure(_) => {
                    Error::AuthenticationFailure(UNKNOWN_CREDENTIALS.to_string())
                }
                other => other,
            })?;
        Ok((user, token))
    }

    /// Public salts of a user.
    pub async fn salts(&self, username: &str) -> Result<UserSalts> {
        let user = self.get_by_username(username).await?;
        Ok(UserSalts {
            encryption_salt: STANDARD.encode(&user.encryption_salt),
            auth_salt: STANDARD.encode(&user.auth_salt),
        })
    }

    /// Record a request by a signed-in user.
    ///
    /// Failures are logged and swallowed.
    pub async fn track_activity(&self, user_id: UserId, url: &str) {
        if let Err(e) = self.ctx.store().track_activity(user_id, url, Utc::now()).await {
            warn!(user_id = %user_id, error = %e, "Failed to record activity");
        }
    }
}
