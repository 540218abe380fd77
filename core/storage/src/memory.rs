//! In-memory capability providers for testing.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::provider::{project, AccessStatus, ContactDirectory, ContactField, SecretStore};
use cofre_common::{ContactRecord, Error, Result};

/// In-memory secret store.
///
/// Clones share the same map, which lets a test drop a gate and open a new
/// session against the same stored secret.
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySecretStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct DirectoryState {
    contacts: BTreeMap<String, ContactRecord>,
    denied: bool,
    failing_deletes: HashSet<String>,
    failing_creates: bool,
}

/// In-memory address book.
///
/// Besides the capability itself it offers switches to simulate a denied
/// permission and failing mutations.
#[derive(Clone, Default)]
pub struct MemoryContactDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl MemoryContactDirectory {
    /// Create a new empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a contact, keeping its identifier when it has one.
    pub async fn insert(&self, record: ContactRecord) -> String {
        let id = record
            .external_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut stored = record;
        stored.external_id = Some(id.clone());
        stored.vault_path = None;
        self.state.write().await.contacts.insert(id.clone(), stored);
        id
    }

    /// Look up a contact by identifier.
    pub async fn get(&self, id: &str) -> Option<ContactRecord> {
        self.state.read().await.contacts.get(id).cloned()
    }

    /// Number of contacts in the directory.
    pub async fn len(&self) -> usize {
        self.state.read().await.contacts.len()
    }

    /// Whether the directory is empty.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.contacts.is_empty()
    }

    /// Make `request_access` answer `Denied`.
    pub async fn deny_access(&self) {
        self.state.write().await.denied = true;
    }

    /// Make deleting `id` fail.
    pub async fn fail_delete_of(&self, id: &str) {
        self.state.write().await.failing_deletes.insert(id.to_string());
    }

    /// Make every `create` fail.
    pub async fn fail_creates(&self) {
        self.state.write().await.failing_creates = true;
    }
}

#[async_trait]
impl ContactDirectory for MemoryContactDirectory {
    fn name(&self) -> &str {
        "memory"
    }

    async fn request_access(&self) -> Result<AccessStatus> {
        if self.state.read().await.denied {
            Ok(AccessStatus::Denied)
        } else {
            Ok(AccessStatus::Granted)
        }
    }

    async fn list(&self, fields: &[ContactField]) -> Result<Vec<ContactRecord>> {
        let state = self.state.read().await;
        if state.denied {
            return Err(Error::AccessDenied("Address book access denied".to_string()));
        }
        Ok(state
            .contacts
            .values()
            .map(|record| project(record, fields))
            .collect())
    }

    async fn create(&self, record: &ContactRecord) -> Result<String> {
        let mut state = self.state.write().await;
        if state.failing_creates {
            return Err(Error::Storage("Address book rejected the contact".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let mut stored = record.clone();
        stored.external_id = Some(id.clone());
        stored.vault_path = None;
        state.contacts.insert(id.clone(), stored);
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.failing_deletes.contains(id) {
            return Err(Error::Storage(format!("Address book refused to delete {}", id)));
        }
        state
            .contacts
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Contact not found: {}", id)))
    }
}
