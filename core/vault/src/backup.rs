//! Vault backup bundles.
//!
//! `export` writes every vault file into one JSON bundle in the cache
//! directory, ready to hand to a share sheet or any other transport.
//! `import` checks the whole bundle before touching the vault, then
//! replays it entry by entry. Import holds the decoded bundle in memory.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{is_contact_file, BACKUP_FILENAME};
use crate::session::UnlockToken;
use crate::store::{validate_name, VaultEntry, VaultStore};
use cofre_common::{BulkResult, Error, MediaKind, Result};
use cofre_crypto::{content_digest, verify_digest};

/// Format tag of a backup bundle.
pub const BACKUP_FORMAT: &str = "cofre-backup";

/// Current bundle version.
pub const BACKUP_VERSION: u32 = 1;

/// What a bundle entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupEntryKind {
    Contact,
    Photo,
    Video,
}

impl BackupEntryKind {
    fn for_name(name: &str) -> Self {
        if is_contact_file(name) {
            return BackupEntryKind::Contact;
        }
        match MediaKind::from_file_name(name) {
            MediaKind::Photo => BackupEntryKind::Photo,
            MediaKind::Video => BackupEntryKind::Video,
        }
    }
}

/// One vault file inside a bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub name: String,
    pub kind: BackupEntryKind,
    pub size: u64,
    /// BLAKE2b-256 of the file content, hex.
    pub digest: String,
    /// File content, base64.
    pub data: String,
}

/// A backup bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupBundle {
    pub format: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<BackupEntry>,
}

/// An entry that passed validation, with its decoded content.
struct CheckedEntry {
    name: String,
    kind: BackupEntryKind,
    content: Vec<u8>,
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn check_bundle(bundle: BackupBundle) -> Result<Vec<CheckedEntry>> {
    if bundle.format != BACKUP_FORMAT {
        return Err(Error::Validation(format!(
            "Not a vault backup (format {:?})",
            bundle.format
        )));
    }
    if bundle.version != BACKUP_VERSION {
        return Err(Error::Validation(format!(
            "Unsupported backup version {}",
            bundle.version
        )));
    }

    let mut names = HashSet::new();
    let mut checked = Vec::with_capacity(bundle.entries.len());

    for entry in bundle.entries {
        validate_name(&entry.name)?;
        if !names.insert(entry.name.clone()) {
            return Err(Error::Validation(format!("Duplicate entry {}", entry.name)));
        }
        if entry.kind != BackupEntryKind::for_name(&entry.name) {
            return Err(Error::Validation(format!(
                "Entry {} is not a {:?}",
                entry.name, entry.kind
            )));
        }

        let content = STANDARD
            .decode(entry.data.as_bytes())
            .map_err(|e| Error::Parse(format!("Entry {}: {}", entry.name, e)))?;
        if content.len() as u64 != entry.size {
            return Err(Error::Validation(format!(
                "Entry {} is truncated",
                entry.name
            )));
        }
        if !verify_digest(&content, &entry.digest) {
            return Err(Error::Validation(format!(
                "Entry {} failed its integrity check",
                entry.name
            )));
        }
        if entry.kind == BackupEntryKind::Contact && std::str::from_utf8(&content).is_err() {
            return Err(Error::Parse(format!("Entry {} is not text", entry.name)));
        }

        checked.push(CheckedEntry {
            name: entry.name,
            kind: entry.kind,
            content,
        });
    }

    Ok(checked)
}

/// Exports and imports vault bundles.
#[derive(Debug, Clone)]
pub struct BackupExporter {
    store: VaultStore,
    cache_dir: PathBuf,
}

impl BackupExporter {
    pub fn new(store: VaultStore, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            cache_dir: cache_dir.into(),
        }
    }

    /// Where `export` writes the bundle.
    pub fn artifact_path(&self) -> PathBuf {
        self.cache_dir.join(BACKUP_FILENAME)
    }

    /// Bundle the vault into a single file outside it.
    ///
    /// An absent vault produces a bundle with no entries. A previous bundle
    /// at the same location is replaced. Entries are streamed to disk one
    /// at a time, so memory use is bounded by the largest vault file (about
    /// four times its size, for the base64 and JSON copies).
    pub async fn export(&self, token: &UnlockToken) -> Result<PathBuf> {
        let mut files = self.store.list(token).await?;
        files.sort_by(|a, b| a.name.cmp(&b.name));

        fs::create_dir_all(&self.cache_dir).await?;
        let path = self.artifact_path();
        let temp = path.with_extension("json.tmp");
        if let Err(e) = self.write_bundle(token, &files, &temp).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }
        fs::rename(&temp, &path).await?;

        info!(path = %path.display(), entries = files.len(), "Vault exported");
        Ok(path)
    }

    async fn write_bundle(
        &self,
        token: &UnlockToken,
        files: &[VaultEntry],
        temp: &Path,
    ) -> Result<()> {
        let mut out = BufWriter::new(fs::File::create(temp).await?);

        let header = format!(
            "{{\"format\":{},\"version\":{},\"created_at\":{},\"entries\":[",
            to_json(BACKUP_FORMAT)?,
            BACKUP_VERSION,
            to_json(&Utc::now())?
        );
        out.write_all(header.as_bytes()).await?;

        for (i, file) in files.iter().enumerate() {
            if i > 0 {
                out.write_all(b",").await?;
            }
            let content = self.store.read_bytes(token, &file.path).await?;
            let entry = BackupEntry {
                name: file.name.clone(),
                kind: BackupEntryKind::for_name(&file.name),
                size: content.len() as u64,
                digest: content_digest(&content),
                data: STANDARD.encode(&content),
            };
            drop(content);
            out.write_all(to_json(&entry)?.as_bytes()).await?;
            debug!(name = %file.name, size = entry.size, "Entry exported");
        }

        out.write_all(b"]}").await?;
        out.flush().await?;
        out.get_ref().sync_all().await?;
        Ok(())
    }

    /// Replay a bundle into the vault.
    ///
    /// The whole bundle is validated first; if anything is wrong nothing is
    /// written. Contacts are written back as text, media go through the
    /// regular move into the vault, so the collision policy applies.
    ///
    /// # Errors
    /// - `NotFound` if the artifact is missing
    /// - `Parse` if it is not a bundle
    /// - `Validation` if the format, version or any entry is wrong
    pub async fn import(&self, token: &UnlockToken, artifact: &Path) -> Result<BulkResult> {
        let raw = fs::read(artifact).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("{}", artifact.display()))
            }
            _ => Error::Io(e),
        })?;
        let bundle: BackupBundle = serde_json::from_slice(&raw)
            .map_err(|e| Error::Parse(format!("Invalid backup bundle: {}", e)))?;
        let entries = check_bundle(bundle)?;

        self.store.ensure_directory(token).await?;
        let staging = self.cache_dir.join(format!("import-{}", Uuid::new_v4()));
        fs::create_dir_all(&staging).await?;

        let mut result = BulkResult::default();
        for entry in entries {
            let outcome = match entry.kind {
                BackupEntryKind::Contact => {
                    let text = String::from_utf8_lossy(&entry.content);
                    self.store
                        .write_text(token, &entry.name, &text)
                        .await
                        .map(|_| ())
                }
                BackupEntryKind::Photo | BackupEntryKind::Video => {
                    self.stage_and_move(token, &staging, &entry).await
                }
            };
            match outcome {
                Ok(()) => result.record_success(),
                Err(e) => {
                    debug!(name = %entry.name, error = %e, "Failed to import entry");
                    result.record_failure(entry.name, e);
                }
            }
        }

        if let Err(e) = fs::remove_dir_all(&staging).await {
            warn!(path = %staging.display(), error = %e, "Failed to clean import staging");
        }

        info!(
            attempted = result.attempted,
            succeeded = result.succeeded,
            "Vault imported"
        );
        Ok(result)
    }

    async fn stage_and_move(
        &self,
        token: &UnlockToken,
        staging: &Path,
        entry: &CheckedEntry,
    ) -> Result<()> {
        let staged = staging.join(&entry.name);
        fs::write(&staged, &entry.content).await?;
        if let Err(e) = self.store.move_in(token, &staged).await {
            let _ = fs::remove_file(&staged).await;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollisionPolicy, PARTIAL_SUFFIX};
    use crate::session::SessionHandle;
    use tempfile::TempDir;

    fn exporter(root: &Path, policy: CollisionPolicy) -> (BackupExporter, UnlockToken) {
        let store = VaultStore::new(root.join("CofreSeguro"), policy);
        let token = UnlockToken::issue(&SessionHandle::new(), store.root());
        (BackupExporter::new(store, root.join("cache")), token)
    }

    fn seed(root: &Path) {
        let vault = root.join("CofreSeguro");
        std::fs::create_dir_all(&vault).unwrap();
        std::fs::write(vault.join("beach.jpg"), b"\xff\xd8jpeg").unwrap();
        std::fs::write(vault.join("clip.mp4"), b"mp4 frames").unwrap();
        std::fs::write(vault.join("contato_A.json"), r#"{"id":"A","name":"Ana"}"#).unwrap();
    }

    fn read_bundle(path: &Path) -> BackupBundle {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_export_bundles_every_file() {
        let temp = TempDir::new().unwrap();
        seed(temp.path());
        let (backup, token) = exporter(temp.path(), CollisionPolicy::Rename);

        let path = backup.export(&token).await.unwrap();
        assert_eq!(path, temp.path().join("cache").join(BACKUP_FILENAME));
        let cache: Vec<_> = std::fs::read_dir(temp.path().join("cache"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(cache, vec![std::ffi::OsString::from(BACKUP_FILENAME)]);

        let bundle = read_bundle(&path);
        assert_eq!(bundle.format, BACKUP_FORMAT);
        assert_eq!(bundle.version, BACKUP_VERSION);
        let kinds: Vec<_> = bundle.entries.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("beach.jpg", BackupEntryKind::Photo),
                ("clip.mp4", BackupEntryKind::Video),
                ("contato_A.json", BackupEntryKind::Contact),
            ]
        );
        assert_eq!(bundle.entries[1].size, 10);
        assert_eq!(bundle.entries[1].digest, content_digest(b"mp4 frames"));
    }

    #[tokio::test]
    async fn test_export_empty_vault() {
        let temp = TempDir::new().unwrap();
        let (backup, token) = exporter(temp.path(), CollisionPolicy::Rename);

        let path = backup.export(&token).await.unwrap();
        assert!(read_bundle(&path).entries.is_empty());
    }

    #[tokio::test]
    async fn test_import_into_fresh_vault() {
        let source = TempDir::new().unwrap();
        seed(source.path());
        let (backup, token) = exporter(source.path(), CollisionPolicy::Rename);
        let artifact = backup.export(&token).await.unwrap();

        let target = TempDir::new().unwrap();
        let (restore, token) = exporter(target.path(), CollisionPolicy::Rename);
        let result = restore.import(&token, &artifact).await.unwrap();

        assert_eq!(result.attempted, 3);
        assert!(result.is_complete());
        let vault = target.path().join("CofreSeguro");
        assert_eq!(std::fs::read(vault.join("clip.mp4")).unwrap(), b"mp4 frames");
        assert_eq!(
            std::fs::read_to_string(vault.join("contato_A.json")).unwrap(),
            r#"{"id":"A","name":"Ana"}"#
        );
        let staged: Vec<_> = std::fs::read_dir(target.path().join("cache"))
            .unwrap()
            .collect();
        assert!(staged.is_empty());
    }

    #[tokio::test]
    async fn test_import_collisions_reported() {
        let temp = TempDir::new().unwrap();
        seed(temp.path());
        let (backup, token) = exporter(temp.path(), CollisionPolicy::Reject);
        let artifact = backup.export(&token).await.unwrap();

        let result = backup.import(&token, &artifact).await.unwrap();

        // Contacts are rewritten in place, media collide.
        assert_eq!(result.attempted, 3);
        assert_eq!(result.succeeded, 1);
        let failed: Vec<_> = result.failures.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(failed, vec!["beach.jpg", "clip.mp4"]);
    }

    #[tokio::test]
    async fn test_import_rejects_tampered_bundle() {
        let temp = TempDir::new().unwrap();
        seed(temp.path());
        let (backup, token) = exporter(temp.path(), CollisionPolicy::Rename);
        let artifact = backup.export(&token).await.unwrap();

        let mut bundle = read_bundle(&artifact);
        bundle.entries[0].data = STANDARD.encode(b"\xff\xd8JPEG");
        std::fs::write(&artifact, serde_json::to_vec(&bundle).unwrap()).unwrap();

        let target = TempDir::new().unwrap();
        let (restore, token) = exporter(target.path(), CollisionPolicy::Rename);
        assert!(matches!(
            restore.import(&token, &artifact).await,
            Err(Error::Validation(_))
        ));
        assert!(!target.path().join("CofreSeguro").exists());
    }

    #[test]
    fn test_check_bundle_rules() {
        let entry = |name: &str, kind| BackupEntry {
            name: name.to_string(),
            kind,
            size: 1,
            digest: content_digest(b"x"),
            data: STANDARD.encode(b"x"),
        };
        let bundle = |entries| BackupBundle {
            format: BACKUP_FORMAT.to_string(),
            version: BACKUP_VERSION,
            created_at: Utc::now(),
            entries,
        };

        assert!(check_bundle(bundle(vec![entry("a.jpg", BackupEntryKind::Photo)])).is_ok());

        let mut wrong_format = bundle(vec![]);
        wrong_format.format = "zip".to_string();
        assert!(check_bundle(wrong_format).is_err());

        let mut wrong_version = bundle(vec![]);
        wrong_version.version = 2;
        assert!(check_bundle(wrong_version).is_err());

        for bad in [
            vec![entry("../a.jpg", BackupEntryKind::Photo)],
            vec![entry(&format!("a{}", PARTIAL_SUFFIX), BackupEntryKind::Photo)],
            vec![entry("a.mov", BackupEntryKind::Photo)],
            vec![
                entry("a.jpg", BackupEntryKind::Photo),
                entry("a.jpg", BackupEntryKind::Photo),
            ],
        ] {
            assert!(check_bundle(bundle(bad)).is_err());
        }
    }

    #[tokio::test]
    async fn test_import_missing_and_garbage() {
        let temp = TempDir::new().unwrap();
        let (backup, token) = exporter(temp.path(), CollisionPolicy::Rename);

        assert!(matches!(
            backup.import(&token, &temp.path().join("none.json")).await,
            Err(Error::NotFound(_))
        ));

        let garbage = temp.path().join("garbage.json");
        std::fs::write(&garbage, "placeholder").unwrap();
        assert!(matches!(
            backup.import(&token, &garbage).await,
            Err(Error::Parse(_))
        ));
    }
}
