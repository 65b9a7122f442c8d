//! Serialized ownership of the in-memory token pair.

use gather_storage::{CredentialStore, StorageError, TokenPair};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Single owner of the current [`TokenPair`].
///
/// Every read and write goes through one mutex, so concurrent refreshers
/// observe one consistent value at a time and writes never interleave. The
/// controller is the only component allowed to mutate stored credentials;
/// persistence happens under the same lock that exposes the new pair.
pub struct TokenController {
    tokens: Mutex<TokenPair>,
    store: Arc<CredentialStore>,
}

impl TokenController {
    /// Restore a controller from a previously persisted pair.
    ///
    /// Returns `None` when the store holds no pair (or a read fails).
    pub fn restore(store: Arc<CredentialStore>) -> Option<Self> {
        let tokens = store.load()?;
        Some(Self {
            tokens: Mutex::new(tokens),
            store,
        })
    }

    /// Create a controller from a freshly issued pair, persisting it
    /// immediately and overwriting any conflicting prior entry.
    pub fn new(tokens: TokenPair, store: Arc<CredentialStore>) -> Result<Self, StorageError> {
        store.save(&tokens)?;
        debug!("Persisted fresh session credentials");
        Ok(Self {
            tokens: Mutex::new(tokens),
            store,
        })
    }

    /// Serialized read of the current pair.
    pub fn current(&self) -> TokenPair {
        self.tokens.lock().expect("lock poisoned").clone()
    }

    /// Serialized write.
    ///
    /// Persists (remove-then-add) before returning when the pair changed. A
    /// store failure is logged and the in-memory value stays authoritative
    /// for the rest of the process lifetime.
    pub fn set(&self, tokens: TokenPair) {
        let mut guard = self.tokens.lock().expect("lock poisoned");
        if *guard == tokens {
            return;
        }
        if let Err(err) = self.store.save(&tokens) {
            warn!(error = %err, "Failed to persist refreshed credentials; keeping in-memory pair");
        }
        *guard = tokens;
    }

    /// Remove persisted credentials from the store.
    ///
    /// Best-effort teardown for logout; failures are logged, never
    /// propagated.
    pub fn dispose(&self) {
        match self.store.clear() {
            Ok(()) => debug!("Removed stored credentials"),
            Err(err) => warn!(error = %err, "Failed to remove stored credentials"),
        }
    }
}
