//! The custody context: every collaborator the services need, built once.

use std::sync::Arc;
use std::time::Duration;

use crate::access::PageAccess;
use crate::accounts::Accounts;
use crate::config::CustodyConfig;
use crate::envelope::Envelope;
use crate::session::SessionManager;
use pagevault_common::{Error, Result};
use pagevault_crypto::{Aes128GcmCipher, Cipher, KdfParams};
use pagevault_storage::{Cache, Store};

/// Shared state for sessions, envelopes and page access.
///
/// Cheap to clone; clones share the same cache and store.
#[derive(Clone)]
pub struct KeyCustodyContext {
    cache: Arc<dyn Cache>,
    store: Arc<dyn Store>,
    cipher: Arc<dyn Cipher>,
    kdf_params: KdfParams,
    session_ttl: Duration,
}

impl KeyCustodyContext {
    /// Create a context with the production cipher and KDF parameters.
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>, config: &CustodyConfig) -> Self {
        Self {
            cache,
            store,
            cipher: Arc::new(Aes128GcmCipher),
            kdf_params: KdfParams::standard(),
            session_ttl: config.session_ttl(),
        }
    }

    /// Replace the cipher.
    pub fn with_cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Replace the KDF parameters.
    ///
    /// Accounts created under non-standard parameters can only be opened by
    /// a context using the same parameters.
    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn cipher(&self) -> &dyn Cipher {
        self.cipher.as_ref()
    }

    pub fn kdf_params(&self) -> KdfParams {
        self.kdf_params
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub fn sessions(&self) -> SessionManager<'_> {
        SessionManager::new(self)
    }

    pub fn envelope(&self) -> Envelope<'_> {
        Envelope::new(self)
    }

    pub fn pages(&self) -> PageAccess<'_> {
        PageAccess::new(self)
    }

    pub fn accounts(&self) -> Accounts<'_> {
        Accounts::new(self)
    }
}

/// Run CPU-heavy work (password hashing, key derivation) off the executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Crypto(format!("Blocking task failed: {}", e)))?
}
