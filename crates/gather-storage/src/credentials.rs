//! Durable persistence for the session token pair.

use crate::{SecureStorage, StorageKeys, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// The access/refresh credential pair issued by the backend.
///
/// Replaced wholesale on refresh, never mutated in place. Equality is
/// structural.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Token material must never reach logs.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Durable key/value home for the session's [`TokenPair`], backed by a
/// [`SecureStorage`] implementation.
///
/// The store holds no business logic: it writes, reads and removes the two
/// token entries. Callers decide what a failure means.
pub struct CredentialStore {
    storage: Box<dyn SecureStorage>,
}

impl CredentialStore {
    /// Create a credential store over the given storage backend.
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Persist a token pair, overwriting any previous one.
    ///
    /// The backing primitive has no update-in-place, so prior entries are
    /// removed first and the new ones written after. The first failure is
    /// reported; callers treat it as log-and-continue.
    pub fn save(&self, pair: &TokenPair) -> StorageResult<()> {
        self.storage.remove(StorageKeys::ACCESS_TOKEN)?;
        self.storage.remove(StorageKeys::REFRESH_TOKEN)?;
        self.storage.add(StorageKeys::ACCESS_TOKEN, &pair.access_token)?;
        self.storage
            .add(StorageKeys::REFRESH_TOKEN, &pair.refresh_token)?;
        debug!("Stored session credentials");
        Ok(())
    }

    /// Load the stored token pair.
    ///
    /// Returns `None` when either entry is missing or any read fails.
    pub fn load(&self) -> Option<TokenPair> {
        let access_token = match self.storage.get(StorageKeys::ACCESS_TOKEN) {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "Failed to read stored access token");
                return None;
            }
        };
        let refresh_token = match self.storage.get(StorageKeys::REFRESH_TOKEN) {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "Failed to read stored refresh token");
                return None;
            }
        };
        Some(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Remove both token entries.
    ///
    /// Both removals are attempted even if the first fails; the first
    /// failure is reported.
    pub fn clear(&self) -> StorageResult<()> {
        let removed_access = self.storage.remove(StorageKeys::ACCESS_TOKEN);
        let removed_refresh = self.storage.remove(StorageKeys::REFRESH_TOKEN);
        removed_access?;
        removed_refresh?;
        Ok(())
    }
}
