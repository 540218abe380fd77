//! Hidden photos and videos.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::is_contact_file;
use crate::session::UnlockToken;
use crate::store::VaultStore;
use cofre_common::{Error, MediaItem, Result};

/// Moves media between public storage and the vault.
#[derive(Debug, Clone)]
pub struct MediaVaultManager {
    store: VaultStore,
}

impl MediaVaultManager {
    pub fn new(store: VaultStore) -> Self {
        Self { store }
    }

    /// Hide a file by moving it into the vault.
    ///
    /// The file disappears from its public location.
    ///
    /// # Errors
    /// - `Validation` if the file name is reserved for contact records
    /// - Anything `VaultStore::move_in` reports
    pub async fn hide(&self, token: &UnlockToken, source: &Path) -> Result<MediaItem> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if is_contact_file(name) {
            return Err(Error::Validation(format!(
                "{} is reserved for contact records; rename it first",
                name
            )));
        }
        self.store.ensure_directory(token).await?;
        let item = self.store.move_in(token, source).await?;
        info!(id = %item.id, kind = %item.kind, "Media hidden");
        Ok(item)
    }

    /// List hidden media, sorted by id.
    ///
    /// Contact record files are not media and are left out.
    pub async fn list(&self, token: &UnlockToken) -> Result<Vec<MediaItem>> {
        let mut items: Vec<MediaItem> = self
            .store
            .list(token)
            .await?
            .into_iter()
            .filter(|entry| !is_contact_file(&entry.name))
            .filter_map(|entry| MediaItem::from_path(entry.path))
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    /// Look up a hidden item by id.
    pub async fn find(&self, token: &UnlockToken, id: &str) -> Result<MediaItem> {
        self.list(token)
            .await?
            .into_iter()
            .find(|item| item.id == id)
            .ok_or_else(|| Error::NotFound(format!("No hidden media named {}", id)))
    }

    /// Permanently delete a hidden item.
    ///
    /// # Errors
    /// - `NotFound` if the item is already gone, even when the vault
    ///   directory itself is missing
    pub async fn remove(&self, token: &UnlockToken, item: &MediaItem) -> Result<()> {
        if !self.store.exists(token).await? {
            return Err(Error::NotFound(format!("No hidden media named {}", item.id)));
        }
        self.store.delete(token, &item.path).await?;
        info!(id = %item.id, "Media removed");
        Ok(())
    }

    /// Move a hidden item back to `dest_dir`.
    pub async fn restore(
        &self,
        token: &UnlockToken,
        item: &MediaItem,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        let restored = self.store.move_out(token, &item.path, dest_dir).await?;
        info!(id = %item.id, dest = %restored.display(), "Media restored");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollisionPolicy;
    use crate::session::SessionHandle;
    use cofre_common::MediaKind;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, MediaVaultManager, UnlockToken) {
        let temp = TempDir::new().unwrap();
        let public = temp.path().join("public");
        std::fs::create_dir_all(&public).unwrap();
        let store = VaultStore::new(temp.path().join("CofreSeguro"), CollisionPolicy::Rename);
        let token = UnlockToken::issue(&SessionHandle::new(), store.root());
        (temp, public, MediaVaultManager::new(store), token)
    }

    fn public_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, name.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_hide_and_list() {
        let (_temp, public, media, token) = setup();

        media.hide(&token, &public_file(&public, "zebra.jpg")).await.unwrap();
        media.hide(&token, &public_file(&public, "clip.MP4")).await.unwrap();
        media.hide(&token, &public_file(&public, "beach.mov")).await.unwrap();

        let items = media.list(&token).await.unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["beach.mov", "clip.MP4", "zebra.jpg"]);
        assert_eq!(items[0].kind, MediaKind::Video);
        assert_eq!(items[1].kind, MediaKind::Video);
        assert_eq!(items[2].kind, MediaKind::Photo);
        assert!(std::fs::read_dir(&public).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_list_empty_vault() {
        let (_temp, _public, media, token) = setup();
        assert!(media.list(&token).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_excludes_contact_records() {
        let (temp, public, media, token) = setup();
        media.hide(&token, &public_file(&public, "a.png")).await.unwrap();
        std::fs::write(temp.path().join("CofreSeguro").join("contato_7.json"), "{}").unwrap();

        let items = media.list(&token).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "a.png");
    }

    #[tokio::test]
    async fn test_remove_surfaces_not_found() {
        let (_temp, public, media, token) = setup();
        let item = media.hide(&token, &public_file(&public, "a.png")).await.unwrap();

        media.remove(&token, &item).await.unwrap();
        assert!(media.list(&token).await.unwrap().is_empty());
        assert!(matches!(
            media.remove(&token, &item).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_without_vault() {
        let (temp, _public, media, token) = setup();
        let item = MediaItem::from_path(temp.path().join("CofreSeguro").join("x.jpg")).unwrap();
        assert!(matches!(
            media.remove(&token, &item).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_hide_rejects_contact_record_names() {
        let (_temp, public, media, token) = setup();
        let source = public_file(&public, "contato_9.json");

        assert!(matches!(
            media.hide(&token, &source).await,
            Err(Error::Validation(_))
        ));
        assert!(source.exists());
        assert!(media.list(&token).await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hide_rejects_symlink() {
        let (_temp, public, media, token) = setup();
        let real = public_file(&public, "real.jpg");
        let link = public.join("link.jpg");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        assert!(matches!(
            media.hide(&token, &link).await,
            Err(Error::Validation(_))
        ));
        assert!(real.exists());
        assert!(std::fs::symlink_metadata(&link).is_ok());
        assert!(media.list(&token).await.unwrap().is_empty());

        let item = media.hide(&token, &real).await.unwrap();
        assert_eq!(media.list(&token).await.unwrap(), vec![item]);
        assert!(!real.exists());
    }

    #[tokio::test]
    async fn test_find_and_restore() {
        let (_temp, public, media, token) = setup();
        media.hide(&token, &public_file(&public, "a.png")).await.unwrap();

        let item = media.find(&token, "a.png").await.unwrap();
        let restored = media.restore(&token, &item, &public).await.unwrap();

        assert_eq!(restored, public.join("a.png"));
        assert_eq!(std::fs::read(&restored).unwrap(), b"a.png");
        assert!(matches!(
            media.find(&token, "a.png").await,
            Err(Error::NotFound(_))
        ));
    }
}
