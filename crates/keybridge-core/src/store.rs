//! Secure credential persistence.
//!
//! The physical secure store is an external collaborator behind the
//! [`CredentialStore`] contract: at most one credential per key, no
//! versioning. The default implementation keeps a single OS keyring entry
//! holding a JSON document of key → credential.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::error::{Error, Result};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Credential>>;
    async fn add_or_update(&self, key: &str, credential: &Credential) -> Result<()>;
    /// Remove the entry for `key`; returns whether anything was removed.
    async fn remove(&self, key: &str) -> Result<bool>;
}

/// The JSON document stored in the keyring entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StoreDocument(HashMap<String, Credential>);

/// Credential store backed by the OS keyring.
pub struct KeyringStore {
    service_name: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new("keybridge")
    }
}

impl KeyringStore {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
        }
    }

    fn username() -> String {
        whoami::username()
    }

    fn load(entry: &keyring::Entry) -> Result<StoreDocument> {
        match entry.get_password() {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::Store(format!("corrupt credential store document: {e}"))),
            Err(keyring::Error::NoEntry) => Ok(StoreDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(entry: &keyring::Entry, document: &StoreDocument) -> Result<()> {
        let raw = serde_json::to_string(document)
            .map_err(|e| Error::Store(format!("cannot serialize credential store: {e}")))?;
        entry.set_password(&raw)?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<Credential>> {
        let service = self.service_name.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<Credential>> {
            let entry = keyring::Entry::new(&service, &Self::username())?;
            let document = Self::load(&entry)?;
            Ok(document.0.get(&key).cloned())
        })
        .await
        .map_err(|e| Error::Store(format!("task join error: {e}")))?
    }

    async fn add_or_update(&self, key: &str, credential: &Credential) -> Result<()> {
        let service = self.service_name.clone();
        let key = key.to_string();
        let credential = credential.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let entry = keyring::Entry::new(&service, &Self::username())?;
            let mut document = Self::load(&entry)?;
            document.0.insert(key, credential);
            Self::save(&entry, &document)
        })
        .await
        .map_err(|e| Error::Store(format!("task join error: {e}")))?
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let service = self.service_name.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<bool> {
            let entry = keyring::Entry::new(&service, &Self::username())?;
            let mut document = Self::load(&entry)?;
            let removed = document.0.remove(&key).is_some();

            if document.0.is_empty() {
                // No credentials left; drop the keyring entry entirely.
                let _ = entry.delete_credential();
            } else if removed {
                Self::save(&entry, &document)?;
            }
            Ok(removed)
        })
        .await
        .map_err(|e| Error::Store(format!("task join error: {e}")))?
    }
}

/// In-memory credential store for tests.
#[derive(Default, Clone)]
pub struct MemoryStore {
    entries: Arc<tokio::sync::Mutex<HashMap<String, Credential>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Credential>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn add_or_update(&self, key: &str, credential: &Credential) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), credential.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_is_at_most_one_entry_per_key() {
        let store = MemoryStore::new();
        let key = "git:https://example.com";

        store
            .add_or_update(key, &Credential::new("alice", "one"))
            .await
            .unwrap();
        store
            .add_or_update(key, &Credential::new("alice", "two"))
            .await
            .unwrap();

        let credential = store.get(key).await.unwrap().unwrap();
        assert_eq!(credential.password, "two");

        assert!(store.remove(key).await.unwrap());
        assert!(!store.remove(key).await.unwrap());
        assert!(store.get(key).await.unwrap().is_none());
    }

    #[test]
    fn store_document_round_trips() {
        let mut document = StoreDocument::default();
        document.0.insert(
            "git:https://example.com".to_string(),
            Credential::new("alice", "secret"),
        );

        let raw = serde_json::to_string(&document).unwrap();
        let parsed: StoreDocument = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            parsed.0.get("git:https://example.com").unwrap().username,
            "alice"
        );
    }
}
