//! Capability trait definitions.

use async_trait::async_trait;

use cofre_common::{ContactRecord, Result};

/// Answer to an address-book permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Granted,
    Denied,
}

/// Fields that can be requested when listing the address book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    Name,
    PhoneNumbers,
}

/// Every field the vault needs to back up a contact.
pub const ALL_CONTACT_FIELDS: &[ContactField] = &[ContactField::Name, ContactField::PhoneNumbers];

/// Key/value store for small secrets (the platform keychain or secure store).
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Get the store name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Read the value under `key`.
    ///
    /// # Returns
    /// `None` when the key has never been set.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Check whether `key` holds a value.
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// The public address book.
///
/// All operations are async. Identifiers are assigned by the directory and
/// are opaque to the vault.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Get the directory name.
    fn name(&self) -> &str;

    /// Ask the platform for access to the address book.
    async fn request_access(&self) -> Result<AccessStatus>;

    /// List every contact, filling only the requested fields.
    ///
    /// The identifier is always present.
    async fn list(&self, fields: &[ContactField]) -> Result<Vec<ContactRecord>>;

    /// Create a contact and return the identifier the directory assigned.
    ///
    /// Any `external_id` on `record` is ignored.
    async fn create(&self, record: &ContactRecord) -> Result<String>;

    /// Delete a contact.
    ///
    /// # Errors
    /// - Contact not found
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Keep only the requested fields of `record`.
pub(crate) fn project(record: &ContactRecord, fields: &[ContactField]) -> ContactRecord {
    ContactRecord {
        external_id: record.external_id.clone(),
        name: if fields.contains(&ContactField::Name) {
            record.name.clone()
        } else {
            String::new()
        },
        phone_numbers: if fields.contains(&ContactField::PhoneNumbers) {
            record.phone_numbers.clone()
        } else {
            Vec::new()
        },
        vault_path: None,
    }
}
