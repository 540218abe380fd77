//! Physical vault directory.
//!
//! `VaultStore` exclusively owns the vault directory. Every member lives
//! directly under the root; there are no nested directories. All operations
//! require an [`UnlockToken`] for this vault.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::{CollisionPolicy, VaultConfig, PARTIAL_SUFFIX};
use crate::session::UnlockToken;
use cofre_common::{Error, MediaItem, Result};

/// A file in the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Outcome of [`VaultStore::purge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOutcome {
    /// The directory was removed along with `removed` files.
    Purged { removed: usize },
    /// There was no vault directory to remove.
    AlreadyEmpty,
}

/// Map an I/O error on `path` to the vault taxonomy.
fn io_error(e: io::Error, path: &Path) -> Error {
    match e.kind() {
        io::ErrorKind::NotFound => Error::NotFound(format!("{}", path.display())),
        _ => Error::Io(e),
    }
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::Validation(format!("Invalid vault file name: {:?}", name)));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(Error::Validation(format!(
            "Vault file names cannot contain separators: {:?}",
            name
        )));
    }
    if name.ends_with(PARTIAL_SUFFIX) {
        return Err(Error::Validation(format!("Reserved file name: {:?}", name)));
    }
    Ok(())
}

fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}{}", name, PARTIAL_SUFFIX))
}

/// Name for the `n`-th collision of `name`: `photo.jpg` becomes `photo-n.jpg`.
fn numbered_name(name: &str, n: usize) -> String {
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if !stem.is_empty() => format!("{}-{}.{}", stem, n, ext),
        _ => format!("{}-{}", name, n),
    }
}

/// Copy `source` to `dest` through a partial file, then remove `source`.
///
/// The source is left untouched unless the copy fully landed at `dest`; if
/// the source cannot be removed afterwards the copy is rolled back.
async fn copy_then_remove(source: &Path, dest: &Path) -> Result<()> {
    let partial = partial_path(dest);

    let copied = async {
        fs::copy(source, &partial).await?;
        fs::File::open(&partial).await?.sync_all().await?;
        fs::rename(&partial, dest).await
    }
    .await;

    if let Err(e) = copied {
        if let Err(cleanup) = fs::remove_file(&partial).await {
            if cleanup.kind() != io::ErrorKind::NotFound {
                warn!(path = %partial.display(), error = %cleanup, "Failed to remove partial copy");
            }
        }
        return Err(io_error(e, source));
    }

    if let Err(e) = fs::remove_file(source).await {
        if let Err(rollback) = fs::remove_file(dest).await {
            warn!(path = %dest.display(), error = %rollback, "Failed to roll back copy");
        }
        return Err(io_error(e, source));
    }

    Ok(())
}

/// Move `source` to `dest`, falling back to copy-then-remove when a rename
/// is not possible (e.g. across filesystems).
async fn relocate(source: &Path, dest: &Path) -> Result<()> {
    match fs::rename(source, dest).await {
        Ok(()) => Ok(()),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ) =>
        {
            Err(io_error(e, source))
        }
        Err(e) => {
            debug!(error = %e, "Rename failed, copying instead");
            copy_then_remove(source, dest).await
        }
    }
}

/// The vault directory.
#[derive(Debug, Clone)]
pub struct VaultStore {
    root: PathBuf,
    collision_policy: CollisionPolicy,
}

impl VaultStore {
    /// Create a store rooted at `root`. Nothing is created on disk yet.
    pub fn new(root: impl Into<PathBuf>, collision_policy: CollisionPolicy) -> Self {
        Self {
            root: root.into(),
            collision_policy,
        }
    }

    /// Create a store for the vault described by `config`.
    pub fn from_config(config: &VaultConfig) -> Self {
        Self::new(config.vault_dir(), config.collision_policy)
    }

    /// Path of the vault directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Collision policy applied by `move_in`.
    pub fn collision_policy(&self) -> CollisionPolicy {
        self.collision_policy
    }

    /// Ensure `path` names a file directly under the vault root.
    fn check_member(&self, path: &Path) -> Result<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Validation(format!("Invalid vault path: {}", path.display())))?;
        if path.parent() != Some(self.root.as_path()) {
            return Err(Error::Validation(format!(
                "Path is not inside the vault: {}",
                path.display()
            )));
        }
        validate_name(name)?;
        Ok(name.to_string())
    }

    async fn root_exists(&self) -> Result<bool> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(Error::Validation(format!(
                "Vault path is not a directory: {}",
                self.root.display()
            ))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Check whether the vault directory exists.
    pub async fn exists(&self, token: &UnlockToken) -> Result<bool> {
        token.authorize(&self.root)?;
        self.root_exists().await
    }

    /// Create the vault directory and its parents if absent.
    ///
    /// # Postconditions
    /// - The directory exists; calling again is a no-op
    ///
    /// # Errors
    /// - Permission denied or other I/O failure
    pub async fn ensure_directory(&self, token: &UnlockToken) -> Result<()> {
        token.authorize(&self.root)?;
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn destination_for(&self, name: &str) -> Result<PathBuf> {
        let dest = self.root.join(name);
        match self.collision_policy {
            CollisionPolicy::Overwrite => Ok(dest),
            CollisionPolicy::Reject => {
                if fs::try_exists(&dest).await? {
                    return Err(Error::AlreadyExists(format!(
                        "The vault already holds {}",
                        name
                    )));
                }
                Ok(dest)
            }
            CollisionPolicy::Rename => {
                let mut candidate = dest;
                let mut n = 0;
                while fs::try_exists(&candidate).await? {
                    n += 1;
                    candidate = self.root.join(numbered_name(name, n));
                }
                Ok(candidate)
            }
        }
    }

    /// Move a file from public storage into the vault.
    ///
    /// # Preconditions
    /// - `source` is an existing regular file outside the vault
    ///
    /// # Postconditions
    /// - The file lives in the vault under its base name (or a numbered
    ///   variant, per the collision policy)
    /// - `source` no longer exists
    ///
    /// # Errors
    /// - `Io` if `source` is missing
    /// - `Validation` if `source` is a symbolic link, not a regular file, or
    ///   already in the vault
    /// - `AlreadyExists` on collision under `CollisionPolicy::Reject`
    /// - I/O failure; the source is then left in place
    pub async fn move_in(&self, token: &UnlockToken, source: &Path) -> Result<MediaItem> {
        token.authorize(&self.root)?;

        let meta = fs::symlink_metadata(source).await?;
        if meta.file_type().is_symlink() {
            return Err(Error::Validation(format!(
                "Symbolic links cannot be hidden: {}",
                source.display()
            )));
        }
        if !meta.is_file() {
            return Err(Error::Validation(format!(
                "Not a regular file: {}",
                source.display()
            )));
        }
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::Validation(format!("Unsupported file name: {}", source.display()))
            })?
            .to_string();
        validate_name(&name)?;

        fs::create_dir_all(&self.root).await?;
        let canonical_root = fs::canonicalize(&self.root).await?;
        let canonical_source = fs::canonicalize(source).await?;
        if canonical_source.starts_with(&canonical_root) {
            return Err(Error::Validation(format!(
                "File is already in the vault: {}",
                source.display()
            )));
        }

        let dest = self.destination_for(&name).await?;
        relocate(source, &dest).await?;

        info!(source = %source.display(), dest = %dest.display(), "Moved into vault");
        MediaItem::from_path(dest)
            .ok_or_else(|| Error::Validation(format!("Unsupported file name: {}", name)))
    }

    /// Move a vault file out to `dest_dir`, keeping its name.
    ///
    /// # Errors
    /// - `NotFound` if the vault file is missing
    /// - `AlreadyExists` if `dest_dir` already holds a file with that name
    pub async fn move_out(
        &self,
        token: &UnlockToken,
        path: &Path,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        token.authorize(&self.root)?;
        let name = self.check_member(path)?;

        fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(&name);
        if fs::try_exists(&dest).await? {
            return Err(Error::AlreadyExists(format!("{}", dest.display())));
        }

        relocate(path, &dest).await?;
        info!(source = %path.display(), dest = %dest.display(), "Moved out of vault");
        Ok(dest)
    }

    /// Create or overwrite a text file in the vault.
    ///
    /// The content is written to a partial file first and renamed into
    /// place, so readers never see a half-written entry.
    pub async fn write_text(&self, token: &UnlockToken, name: &str, content: &str) -> Result<PathBuf> {
        self.write_bytes(token, name, content.as_bytes()).await
    }

    /// Create or overwrite a file in the vault with raw bytes.
    pub async fn write_bytes(&self, token: &UnlockToken, name: &str, content: &[u8]) -> Result<PathBuf> {
        token.authorize(&self.root)?;
        validate_name(name)?;
        fs::create_dir_all(&self.root).await?;

        let dest = self.root.join(name);
        let partial = partial_path(&dest);
        fs::write(&partial, content).await?;
        if let Err(e) = fs::rename(&partial, &dest).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!(path = %dest.display(), size = content.len(), "Vault file written");
        Ok(dest)
    }

    /// Read a text file from the vault.
    ///
    /// # Errors
    /// - `NotFound` if absent
    /// - `Parse` if the file is not UTF-8
    pub async fn read_text(&self, token: &UnlockToken, path: &Path) -> Result<String> {
        let bytes = self.read_bytes(token, path).await?;
        String::from_utf8(bytes)
            .map_err(|_| Error::Parse(format!("Not a text file: {}", path.display())))
    }

    /// Read a file from the vault.
    pub async fn read_bytes(&self, token: &UnlockToken, path: &Path) -> Result<Vec<u8>> {
        token.authorize(&self.root)?;
        self.check_member(path)?;
        fs::read(path).await.map_err(|e| io_error(e, path))
    }

    /// Delete a vault file.
    ///
    /// # Errors
    /// - `NotFound` if the vault directory exists but the file does not;
    ///   nothing is reported when the directory itself is absent
    /// - `Validation` if `path` is outside the vault
    pub async fn delete(&self, token: &UnlockToken, path: &Path) -> Result<()> {
        token.authorize(&self.root)?;
        self.check_member(path)?;

        if !self.root_exists().await? {
            debug!(path = %path.display(), "Vault absent, nothing to delete");
            return Ok(());
        }

        fs::remove_file(path).await.map_err(|e| io_error(e, path))?;
        info!(path = %path.display(), "Vault file deleted");
        Ok(())
    }

    /// List the files in the vault.
    ///
    /// Returns an empty list when the vault directory does not exist yet.
    /// Order is unspecified.
    pub async fn list(&self, token: &UnlockToken) -> Result<Vec<VaultEntry>> {
        token.authorize(&self.root)?;
        if !self.root_exists().await? {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };
            if name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            results.push(VaultEntry {
                name,
                path: entry.path(),
            });
        }

        Ok(results)
    }

    /// Delete the whole vault directory.
    ///
    /// # Returns
    /// `AlreadyEmpty` (not an error) when there is no directory.
    pub async fn purge(&self, token: &UnlockToken) -> Result<PurgeOutcome> {
        token.authorize(&self.root)?;
        if !self.root_exists().await? {
            info!("Vault already empty");
            return Ok(PurgeOutcome::AlreadyEmpty);
        }

        let removed = self.list(token).await?.len();
        fs::remove_dir_all(&self.root).await?;

        info!(removed = removed, "Vault purged");
        Ok(PurgeOutcome::Purged { removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionHandle;
    use cofre_common::MediaKind;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        public: PathBuf,
        store: VaultStore,
        token: UnlockToken,
    }

    fn fixture(policy: CollisionPolicy) -> Fixture {
        let temp = TempDir::new().unwrap();
        let public = temp.path().join("DCIM");
        std::fs::create_dir_all(&public).unwrap();
        let store = VaultStore::new(temp.path().join("app").join("CofreSeguro"), policy);
        let token = UnlockToken::issue(&SessionHandle::new(), store.root());
        Fixture {
            _temp: temp,
            public,
            store,
            token,
        }
    }

    fn public_file(f: &Fixture, name: &str, data: &[u8]) -> PathBuf {
        let path = f.public.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn test_ensure_directory_idempotent() {
        let f = fixture(CollisionPolicy::Rename);
        assert!(!f.store.exists(&f.token).await.unwrap());

        f.store.ensure_directory(&f.token).await.unwrap();
        f.store.ensure_directory(&f.token).await.unwrap();

        assert!(f.store.exists(&f.token).await.unwrap());
        assert!(f.store.list(&f.token).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_in_moves() {
        let f = fixture(CollisionPolicy::Rename);
        let source = public_file(&f, "clip.MP4", b"video");

        let item = f.store.move_in(&f.token, &source).await.unwrap();

        assert!(!source.exists());
        assert_eq!(item.id, "clip.MP4");
        assert_eq!(item.kind, MediaKind::Video);
        assert_eq!(item.path, f.store.root().join("clip.MP4"));
        assert_eq!(std::fs::read(&item.path).unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_move_in_missing_source() {
        let f = fixture(CollisionPolicy::Rename);
        let result = f.store.move_in(&f.token, &f.public.join("nope.jpg")).await;
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), cofre_common::ErrorKind::Io);
    }

    #[tokio::test]
    async fn test_move_in_rejects_directory_and_vault_members() {
        let f = fixture(CollisionPolicy::Rename);
        let result = f.store.move_in(&f.token, &f.public).await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let item = f
            .store
            .move_in(&f.token, &public_file(&f, "a.jpg", b"a"))
            .await
            .unwrap();
        let result = f.store.move_in(&f.token, &item.path).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(item.path.exists());
    }

    #[tokio::test]
    async fn test_collision_rename() {
        let f = fixture(CollisionPolicy::Rename);
        f.store
            .move_in(&f.token, &public_file(&f, "photo.jpg", b"1"))
            .await
            .unwrap();
        let second = f
            .store
            .move_in(&f.token, &public_file(&f, "photo.jpg", b"2"))
            .await
            .unwrap();
        let third = f
            .store
            .move_in(&f.token, &public_file(&f, "photo.jpg", b"3"))
            .await
            .unwrap();

        assert_eq!(second.id, "photo-1.jpg");
        assert_eq!(third.id, "photo-2.jpg");
        assert_eq!(std::fs::read(f.store.root().join("photo.jpg")).unwrap(), b"1");
        assert_eq!(f.store.list(&f.token).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_collision_reject_keeps_source() {
        let f = fixture(CollisionPolicy::Reject);
        f.store
            .move_in(&f.token, &public_file(&f, "photo.jpg", b"1"))
            .await
            .unwrap();
        let source = public_file(&f, "photo.jpg", b"2");

        let result = f.store.move_in(&f.token, &source).await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_collision_overwrite() {
        let f = fixture(CollisionPolicy::Overwrite);
        f.store
            .move_in(&f.token, &public_file(&f, "photo.jpg", b"1"))
            .await
            .unwrap();
        f.store
            .move_in(&f.token, &public_file(&f, "photo.jpg", b"2"))
            .await
            .unwrap();

        assert_eq!(f.store.list(&f.token).await.unwrap().len(), 1);
        assert_eq!(std::fs::read(f.store.root().join("photo.jpg")).unwrap(), b"2");
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("photo.jpg", 1), "photo-1.jpg");
        assert_eq!(numbered_name("archive.tar.gz", 2), "archive.tar-2.gz");
        assert_eq!(numbered_name("README", 3), "README-3");
        assert_eq!(numbered_name(".hidden", 1), ".hidden-1");
    }

    #[tokio::test]
    async fn test_copy_then_remove() {
        let f = fixture(CollisionPolicy::Rename);
        f.store.ensure_directory(&f.token).await.unwrap();
        let source = public_file(&f, "big.mov", b"frames");
        let dest = f.store.root().join("big.mov");

        copy_then_remove(&source, &dest).await.unwrap();

        assert!(!source.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"frames");
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_copy_failure_keeps_source() {
        let f = fixture(CollisionPolicy::Rename);
        let source = public_file(&f, "big.mov", b"frames");
        let dest = f.store.root().join("missing-dir").join("big.mov");

        assert!(copy_then_remove(&source, &dest).await.is_err());
        assert_eq!(std::fs::read(&source).unwrap(), b"frames");
    }

    #[tokio::test]
    async fn test_move_out() {
        let f = fixture(CollisionPolicy::Rename);
        let item = f
            .store
            .move_in(&f.token, &public_file(&f, "a.jpg", b"a"))
            .await
            .unwrap();

        let restored = f
            .store
            .move_out(&f.token, &item.path, &f.public)
            .await
            .unwrap();
        assert_eq!(restored, f.public.join("a.jpg"));
        assert!(!item.path.exists());

        let result = f.store.move_out(&f.token, &item.path, &f.public).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_write_and_read_text() {
        let f = fixture(CollisionPolicy::Rename);
        let path = f
            .store
            .write_text(&f.token, "contato_1.json", "{\"name\":\"Ana\"}")
            .await
            .unwrap();
        assert_eq!(path, f.store.root().join("contato_1.json"));

        f.store
            .write_text(&f.token, "contato_1.json", "{\"name\":\"Bia\"}")
            .await
            .unwrap();
        let content = f.store.read_text(&f.token, &path).await.unwrap();
        assert_eq!(content, "{\"name\":\"Bia\"}");
    }

    #[tokio::test]
    async fn test_write_rejects_nested_names() {
        let f = fixture(CollisionPolicy::Rename);
        for name in ["a/b.json", "..", "", "x.cofre-partial"] {
            let result = f.store.write_text(&f.token, name, "x").await;
            assert!(matches!(result, Err(Error::Validation(_))), "{:?}", name);
        }
    }

    #[tokio::test]
    async fn test_read_missing() {
        let f = fixture(CollisionPolicy::Rename);
        let path = f.store.root().join("nope.json");
        assert!(matches!(
            f.store.read_text(&f.token, &path).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_semantics() {
        let f = fixture(CollisionPolicy::Rename);
        let path = f.store.root().join("gone.jpg");

        // No directory yet: nothing to report.
        f.store.delete(&f.token, &path).await.unwrap();

        f.store.ensure_directory(&f.token).await.unwrap();
        assert!(matches!(
            f.store.delete(&f.token, &path).await,
            Err(Error::NotFound(_))
        ));

        let written = f.store.write_text(&f.token, "gone.jpg", "x").await.unwrap();
        f.store.delete(&f.token, &written).await.unwrap();
        assert!(!written.exists());
    }

    #[tokio::test]
    async fn test_delete_outside_vault() {
        let f = fixture(CollisionPolicy::Rename);
        let outside = public_file(&f, "keep.jpg", b"k");
        assert!(matches!(
            f.store.delete(&f.token, &outside).await,
            Err(Error::Validation(_))
        ));
        assert!(outside.exists());
    }

    #[tokio::test]
    async fn test_list_skips_directories_and_partials() {
        let f = fixture(CollisionPolicy::Rename);
        f.store.write_text(&f.token, "a.txt", "a").await.unwrap();
        std::fs::create_dir(f.store.root().join("nested")).unwrap();
        std::fs::write(f.store.root().join(".b.jpg.cofre-partial"), b"b").unwrap();

        let entries = f.store.list(&f.token).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.txt");
    }

    #[tokio::test]
    async fn test_purge_idempotent() {
        let f = fixture(CollisionPolicy::Rename);
        assert_eq!(
            f.store.purge(&f.token).await.unwrap(),
            PurgeOutcome::AlreadyEmpty
        );

        f.store.write_text(&f.token, "a.txt", "a").await.unwrap();
        f.store.write_text(&f.token, "b.txt", "b").await.unwrap();
        assert_eq!(
            f.store.purge(&f.token).await.unwrap(),
            PurgeOutcome::Purged { removed: 2 }
        );
        assert!(!f.store.root().exists());
        assert_eq!(
            f.store.purge(&f.token).await.unwrap(),
            PurgeOutcome::AlreadyEmpty
        );
    }

    #[tokio::test]
    async fn test_foreign_token_rejected() {
        let f = fixture(CollisionPolicy::Rename);
        let foreign = UnlockToken::issue(&SessionHandle::new(), Path::new("/elsewhere"));

        assert!(matches!(
            f.store.ensure_directory(&foreign).await,
            Err(Error::Auth(_))
        ));
        assert!(matches!(f.store.list(&foreign).await, Err(Error::Auth(_))));
    }
}
