//! Hidden contacts.
//!
//! A hidden contact is one JSON file, `contato_<id>.json`, holding the
//! record's fields. Both hide and restore write the new copy before
//! removing the old one, so a failure in between duplicates a contact but
//! never loses it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{contact_file_name, is_contact_file};
use crate::session::UnlockToken;
use crate::store::VaultStore;
use cofre_common::{BulkHideResult, ContactRecord, Error, Result};
use cofre_storage::{AccessStatus, ContactDirectory, ALL_CONTACT_FIELDS};

/// Phone number as found in a record file.
///
/// Older files carry address-book entries (`{"number": ...}`) rather than
/// plain strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredPhone {
    Plain(String),
    Entry { number: String },
}

impl StoredPhone {
    fn into_number(self) -> String {
        match self {
            StoredPhone::Plain(number) | StoredPhone::Entry { number } => number,
        }
    }
}

/// On-disk layout of a hidden contact.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredContact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    phone_numbers: Vec<StoredPhone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hidden_at: Option<DateTime<Utc>>,
}

impl StoredContact {
    fn from_record(record: &ContactRecord) -> Self {
        Self {
            id: record.external_id.clone(),
            name: record.name.clone(),
            phone_numbers: record
                .phone_numbers
                .iter()
                .cloned()
                .map(StoredPhone::Plain)
                .collect(),
            hidden_at: Some(Utc::now()),
        }
    }

    fn into_record(self, vault_path: PathBuf) -> ContactRecord {
        ContactRecord {
            external_id: self.id,
            name: self.name,
            phone_numbers: self
                .phone_numbers
                .into_iter()
                .map(StoredPhone::into_number)
                .collect(),
            vault_path: Some(vault_path),
        }
    }
}

fn parse_record(json: &str, path: &Path) -> Result<ContactRecord> {
    let stored: StoredContact = serde_json::from_str(json)
        .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?;
    Ok(stored.into_record(path.to_path_buf()))
}

/// Moves contacts between the address book and the vault.
#[derive(Clone)]
pub struct ContactVaultManager {
    store: VaultStore,
    directory: Arc<dyn ContactDirectory>,
}

impl ContactVaultManager {
    pub fn new(store: VaultStore, directory: Arc<dyn ContactDirectory>) -> Self {
        Self { store, directory }
    }

    /// The address book this manager de-lists from.
    pub fn directory(&self) -> &Arc<dyn ContactDirectory> {
        &self.directory
    }

    /// Hide one contact: write its record to the vault, then delete it
    /// from the address book.
    ///
    /// # Errors
    /// - `Validation` if the record has no address-book id
    /// - Write failure; the address book is left untouched
    /// - Address book delete failure; the vault copy is kept
    pub async fn hide_contact(&self, token: &UnlockToken, record: &ContactRecord) -> Result<PathBuf> {
        let id = record
            .external_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Validation("Contact has no address book id".to_string()))?;

        let json = serde_json::to_string_pretty(&StoredContact::from_record(record))
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let path = self
            .store
            .write_text(token, &contact_file_name(id), &json)
            .await?;

        if let Err(e) = self.directory.delete(id).await {
            warn!(id = %id, error = %e, "Contact saved to vault but not removed from address book");
            return Err(e);
        }

        info!(id = %id, "Contact hidden");
        Ok(path)
    }

    /// Hide several contacts, one at a time.
    ///
    /// A failing id is recorded and the batch moves on; nothing is rolled
    /// back. Repeated ids are processed once.
    ///
    /// # Errors
    /// - `AccessDenied` if the address book refuses access; nothing is
    ///   written in that case
    pub async fn hide_many(&self, token: &UnlockToken, ids: &[String]) -> Result<BulkHideResult> {
        if self.directory.request_access().await? == AccessStatus::Denied {
            return Err(Error::AccessDenied(
                "Address book access was denied".to_string(),
            ));
        }
        self.store.ensure_directory(token).await?;

        let mut contacts: HashMap<String, ContactRecord> = self
            .directory
            .list(ALL_CONTACT_FIELDS)
            .await?
            .into_iter()
            .filter_map(|record| record.external_id.clone().map(|id| (id, record)))
            .collect();

        let mut seen = HashSet::new();
        let mut result = BulkHideResult::default();

        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            let Some(record) = contacts.remove(id) else {
                result.record_failure(id.clone(), "Contact not found in address book");
                continue;
            };
            match self.hide_contact(token, &record).await {
                Ok(_) => result.record_success(),
                Err(e) => {
                    debug!(id = %id, error = %e, "Failed to hide contact");
                    result.record_failure(id.clone(), e);
                }
            }
        }

        info!(
            attempted = result.attempted,
            succeeded = result.succeeded,
            "Contacts hidden"
        );
        Ok(result)
    }

    /// List hidden contacts, sorted by file name.
    ///
    /// Unreadable or malformed files are logged and skipped.
    pub async fn list(&self, token: &UnlockToken) -> Result<Vec<ContactRecord>> {
        let mut entries: Vec<_> = self
            .store
            .list(token)
            .await?
            .into_iter()
            .filter(|entry| is_contact_file(&entry.name))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let parsed = match self.store.read_text(token, &entry.path).await {
                Ok(json) => parse_record(&json, &entry.path),
                Err(e) => Err(e),
            };
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => warn!(file = %entry.name, error = %e, "Skipping unreadable contact"),
            }
        }

        Ok(records)
    }

    /// Load one hidden contact by file name.
    pub async fn load(&self, token: &UnlockToken, file_name: &str) -> Result<ContactRecord> {
        if !is_contact_file(file_name) {
            return Err(Error::Validation(format!(
                "Not a contact record: {}",
                file_name
            )));
        }
        let path = self.store.root().join(file_name);
        let json = self.store.read_text(token, &path).await?;
        parse_record(&json, &path)
    }

    /// Restore a hidden contact to the address book.
    ///
    /// The contact gets a fresh id from the address book; the vault file
    /// is removed afterwards.
    ///
    /// # Returns
    /// The id assigned by the address book.
    ///
    /// # Errors
    /// - `Validation` if the record was not read from the vault
    /// - Create failure; the vault file is kept
    /// - Delete failure; the contact now exists in both places
    pub async fn restore_contact(&self, token: &UnlockToken, record: &ContactRecord) -> Result<String> {
        let vault_path = record
            .vault_path
            .clone()
            .ok_or_else(|| Error::Validation("Contact was not read from the vault".to_string()))?;

        let mut fresh = record.clone();
        fresh.external_id = None;
        fresh.vault_path = None;
        let new_id = self.directory.create(&fresh).await?;

        if let Err(e) = self.store.delete(token, &vault_path).await {
            warn!(id = %new_id, error = %e, "Contact restored but vault copy remains");
            return Err(e);
        }

        info!(id = %new_id, "Contact restored");
        Ok(new_id)
    }
}
