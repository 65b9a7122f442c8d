//! Secure storage abstraction for the Gather client.
//!
//! This crate provides platform-specific secure storage implementations:
//! - **macOS**: Keychain Access via `security-framework`
//! - **Linux**: Secret Service (GNOME Keyring / KWallet) via `secret-service`
//! - **Windows**: Credential Vault via `windows` crate
//!
//! On top of the raw tag-based primitive sits [`CredentialStore`], the durable
//! home of the session's [`TokenPair`].

mod credentials;
mod keys;
mod traits;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "windows")]
mod windows;

pub use credentials::{CredentialStore, TokenPair};
pub use keys::StorageKeys;
pub use traits::SecureStorage;

use thiserror::Error;

/// Service name used for all storage operations.
/// Must match the mobile app's service name to share keychain entries.
pub const SERVICE_NAME: &str = "com.gather.app";

/// Error type for storage operations.
///
/// Add, read and remove failures are distinct so callers can report which
/// half of an overwrite sequence went wrong.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Adding a secure item failed
    #[error("adding secure item failed: {0}")]
    Add(String),

    /// Reading a secure item failed
    #[error("reading secure item failed: {0}")]
    Read(String),

    /// Removing a secure item failed
    #[error("removing secure item failed: {0}")]
    Remove(String),

    /// Encoding/decoding error
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Platform storage is unavailable
    #[error("platform storage error: {0}")]
    Platform(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default platform-specific storage implementation.
pub fn create_storage() -> StorageResult<Box<dyn SecureStorage>> {
    #[cfg(target_os = "macos")]
    {
        let storage = macos::KeychainStorage::new(SERVICE_NAME)?;
        Ok(Box::new(storage))
    }

    #[cfg(target_os = "linux")]
    {
        let storage = linux::SecretServiceStorage::new(SERVICE_NAME)?;
        Ok(Box::new(storage))
    }

    #[cfg(target_os = "windows")]
    {
        let storage = windows::CredentialVaultStorage::new(SERVICE_NAME)?;
        Ok(Box::new(storage))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        Err(StorageError::Platform(
            "No secure storage implementation available for this platform".to_string(),
        ))
    }
}

/// Create a [`CredentialStore`] with the default platform storage.
pub fn create_credential_store() -> StorageResult<CredentialStore> {
    let storage = create_storage()?;
    Ok(CredentialStore::new(storage))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{SecureStorage, StorageError, StorageResult};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory storage for testing. Records every operation so tests can
    /// assert on sequencing, and can be told to fail each primitive.
    pub struct MemoryStorage {
        data: Mutex<HashMap<String, String>>,
        pub ops: Mutex<Vec<String>>,
        pub fail_adds: Mutex<bool>,
        pub fail_reads: Mutex<bool>,
        pub fail_removes: Mutex<bool>,
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self {
                data: Mutex::new(HashMap::new()),
                ops: Mutex::new(Vec::new()),
                fail_adds: Mutex::new(false),
                fail_reads: Mutex::new(false),
                fail_removes: Mutex::new(false),
            }
        }

        pub fn with_entries(entries: &[(&str, &str)]) -> Self {
            let storage = Self::new();
            {
                let mut data = storage.data.lock().unwrap();
                for (key, value) in entries {
                    data.insert(key.to_string(), value.to_string());
                }
            }
            storage
        }

        pub fn recorded_ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }

        pub fn set_fail_adds(&self, fail: bool) {
            *self.fail_adds.lock().unwrap() = fail;
        }

        pub fn set_fail_reads(&self, fail: bool) {
            *self.fail_reads.lock().unwrap() = fail;
        }

        pub fn set_fail_removes(&self, fail: bool) {
            *self.fail_removes.lock().unwrap() = fail;
        }
    }

    impl SecureStorage for MemoryStorage {
        fn add(&self, key: &str, value: &str) -> StorageResult<()> {
            self.ops.lock().unwrap().push(format!("add:{key}"));
            if *self.fail_adds.lock().unwrap() {
                return Err(StorageError::Add("injected add failure".to_string()));
            }
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.ops.lock().unwrap().push(format!("get:{key}"));
            if *self.fail_reads.lock().unwrap() {
                return Err(StorageError::Read("injected read failure".to_string()));
            }
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        fn remove(&self, key: &str) -> StorageResult<bool> {
            self.ops.lock().unwrap().push(format!("remove:{key}"));
            if *self.fail_removes.lock().unwrap() {
                return Err(StorageError::Remove("injected remove failure".to_string()));
            }
            Ok(self.data.lock().unwrap().remove(key).is_some())
        }
    }
}
