//! macOS Keychain implementation.

use crate::{SecureStorage, StorageError, StorageResult};
use security_framework::item::{ItemClass, ItemSearchOptions, Limit, SearchResult};
use security_framework::passwords::{delete_generic_password, set_generic_password};
use tracing::debug;

/// Keychain-based secure storage for macOS.
pub struct KeychainStorage {
    service_name: String,
}

impl KeychainStorage {
    /// Create a new Keychain storage instance.
    pub fn new(service_name: &str) -> StorageResult<Self> {
        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    fn search_keychain(&self, key: &str) -> StorageResult<Option<String>> {
        let mut search = ItemSearchOptions::new();
        search
            .class(ItemClass::generic_password())
            .service(&self.service_name)
            .account(key)
            .limit(Limit::Max(1))
            .load_data(true);

        match search.search() {
            Ok(results) => {
                if results.is_empty() {
                    return Ok(None);
                }

                if let Some(SearchResult::Data(data)) = results.into_iter().next() {
                    let value = String::from_utf8(data)
                        .map_err(|e| StorageError::Encoding(e.to_string()))?;
                    return Ok(Some(value));
                }

                Ok(None)
            }
            Err(e) => {
                let error_str = e.to_string().to_lowercase();
                // Handle "item not found" errors - various forms the error can take
                if error_str.contains("not found")
                    || error_str.contains("could not be found")
                    || error_str.contains("-25300")
                    || error_str.contains("errsecitemnotfound")
                {
                    Ok(None)
                } else {
                    Err(StorageError::Read(format!(
                        "Failed to get keychain item: {}",
                        e
                    )))
                }
            }
        }
    }
}

impl SecureStorage for KeychainStorage {
    fn add(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service_name, key = %key, "Adding keychain item");

        // Delete existing item first (ignore errors if it doesn't exist)
        let _ = delete_generic_password(&self.service_name, key);

        set_generic_password(&self.service_name, key, value.as_bytes())
            .map_err(|e| StorageError::Add(format!("Failed to add keychain item: {}", e)))?;

        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        debug!(service = %self.service_name, key = %key, "Getting keychain item");
        self.search_keychain(key)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service_name, key = %key, "Removing keychain item");

        match delete_generic_password(&self.service_name, key) {
            Ok(()) => Ok(true),
            Err(e) => {
                let error_str = e.to_string();
                if error_str.contains("not found") || error_str.contains("-25300") {
                    Ok(false)
                } else {
                    Err(StorageError::Remove(format!(
                        "Failed to remove keychain item: {}",
                        e
                    )))
                }
            }
        }
    }
}
