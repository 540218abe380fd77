//! File-backed capability providers.
//!
//! Used by hosts without a platform keychain or address book. Both stores
//! keep a single JSON document and rewrite it through a temporary file, so a
//! crash mid-write leaves the previous document intact.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::provider::{project, AccessStatus, ContactDirectory, ContactField, SecretStore};
use cofre_common::{ContactRecord, Error, Result};

/// Read a JSON document, or `None` when the file does not exist yet.
async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace a JSON document through a temporary sibling file.
async fn write_json<T: serde::Serialize>(path: &Path, value: &T, private: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let data =
        serde_json::to_vec_pretty(value).map_err(|e| Error::Serialization(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &data).await?;

    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    let _ = private;

    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Secret store persisted as a JSON object in a single file.
///
/// On Unix the file is readable by its owner only.
pub struct FileSecretStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecretStore {
    /// Create a store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let values: BTreeMap<String, String> = read_json(&self.path).await?.unwrap_or_default();
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut values: BTreeMap<String, String> =
            read_json(&self.path).await?.unwrap_or_default();
        values.insert(key.to_string(), value.to_string());
        write_json(&self.path, &values, true).await?;

        debug!(key = key, "Secret stored");
        Ok(())
    }
}

/// Address book persisted as a JSON array of contacts.
pub struct FileContactDirectory {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileContactDirectory {
    /// Create a directory backed by `path`. A missing file is an empty book.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<ContactRecord>> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }
}

#[async_trait]
impl ContactDirectory for FileContactDirectory {
    fn name(&self) -> &str {
        "file"
    }

    async fn request_access(&self) -> Result<AccessStatus> {
        match fs::metadata(&self.path).await {
            Ok(meta) if meta.permissions().readonly() => Ok(AccessStatus::Denied),
            Ok(_) => Ok(AccessStatus::Granted),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AccessStatus::Granted),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Ok(AccessStatus::Denied)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, fields: &[ContactField]) -> Result<Vec<ContactRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .iter()
            .map(|record| project(record, fields))
            .collect())
    }

    async fn create(&self, record: &ContactRecord) -> Result<String> {
        let _guard = self.lock.lock().await;
        let mut contacts = self.load().await?;

        let id = Uuid::new_v4().to_string();
        let mut stored = record.clone();
        stored.external_id = Some(id.clone());
        stored.vault_path = None;
        contacts.push(stored);
        write_json(&self.path, &contacts, false).await?;

        debug!(id = %id, "Contact created");
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut contacts = self.load().await?;

        let before = contacts.len();
        contacts.retain(|c| c.external_id.as_deref() != Some(id));
        if contacts.len() == before {
            return Err(Error::NotFound(format!("Contact not found: {}", id)));
        }
        write_json(&self.path, &contacts, false).await?;

        debug!(id = id, "Contact deleted");
        Ok(())
    }
}
