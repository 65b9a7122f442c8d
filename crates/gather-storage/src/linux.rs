//! Linux Secret Service implementation.

use crate::{SecureStorage, StorageError, StorageResult};
use secret_service::{blocking::SecretService, EncryptionType};
use std::collections::HashMap;
use tracing::debug;

/// Secret Service based secure storage for Linux.
pub struct SecretServiceStorage {
    service_name: String,
}

impl SecretServiceStorage {
    /// Create a new Secret Service storage instance.
    pub fn new(service_name: &str) -> StorageResult<Self> {
        // Verify we can connect to Secret Service
        SecretService::connect(EncryptionType::Dh).map_err(|e| {
            StorageError::Platform(format!("Failed to connect to Secret Service: {}", e))
        })?;

        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    fn with_collection<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&secret_service::blocking::Collection) -> StorageResult<T>,
    {
        let ss = SecretService::connect(EncryptionType::Dh)
            .map_err(|e| StorageError::Platform(e.to_string()))?;

        let collection = ss
            .get_default_collection()
            .map_err(|e| StorageError::Platform(e.to_string()))?;

        // Unlock the collection if needed
        if collection.is_locked().unwrap_or(false) {
            collection.unlock().map_err(|e| {
                StorageError::Platform(format!("Failed to unlock collection: {}", e))
            })?;
        }

        f(&collection)
    }

    fn build_attributes<'a>(&'a self, key: &'a str) -> HashMap<&'a str, &'a str> {
        let mut attrs = HashMap::new();
        attrs.insert("service", self.service_name.as_str());
        attrs.insert("key", key);
        attrs
    }
}

impl SecureStorage for SecretServiceStorage {
    fn add(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service_name, key = %key, "Adding secret");

        // Delete existing item first
        let _ = self.remove(key);

        self.with_collection(|collection| {
            let attrs = self.build_attributes(key);
            let label = format!("{}/{}", self.service_name, key);

            collection
                .create_item(
                    &label,
                    attrs,
                    value.as_bytes(),
                    true, // replace
                    "text/plain",
                )
                .map_err(|e| StorageError::Add(e.to_string()))?;

            Ok(())
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        debug!(service = %self.service_name, key = %key, "Getting secret");

        self.with_collection(|collection| {
            let attrs = self.build_attributes(key);

            let items = collection
                .search_items(attrs)
                .map_err(|e| StorageError::Read(e.to_string()))?;

            if items.is_empty() {
                return Ok(None);
            }

            let secret = items[0]
                .get_secret()
                .map_err(|e| StorageError::Read(e.to_string()))?;

            let value =
                String::from_utf8(secret).map_err(|e| StorageError::Encoding(e.to_string()))?;

            Ok(Some(value))
        })
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service_name, key = %key, "Removing secret");

        self.with_collection(|collection| {
            let attrs = self.build_attributes(key);

            let items = collection
                .search_items(attrs)
                .map_err(|e| StorageError::Remove(e.to_string()))?;

            if items.is_empty() {
                return Ok(false);
            }

            items[0]
                .delete()
                .map_err(|e| StorageError::Remove(e.to_string()))?;

            Ok(true)
        })
    }
}
