//! Vault manager wiring the gate and the vault components together.

use serde::Serialize;
use std::sync::Arc;

use crate::backup::BackupExporter;
use crate::config::VaultConfig;
use crate::contacts::ContactVaultManager;
use crate::gate::MasterPasswordGate;
use crate::media::MediaVaultManager;
use crate::recovery::StoredSecurityQuestion;
use crate::session::UnlockToken;
use crate::store::{PurgeOutcome, VaultStore};
use cofre_common::{MediaKind, Result};
use cofre_storage::{ContactDirectory, SecretStore};

/// Counts of what the vault holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VaultSummary {
    pub photos: usize,
    pub videos: usize,
    pub contacts: usize,
}

/// Entry point for a host application.
pub struct VaultManager {
    config: VaultConfig,
    secrets: Arc<dyn SecretStore>,
    store: VaultStore,
    media: MediaVaultManager,
    contacts: ContactVaultManager,
    backup: BackupExporter,
}

impl VaultManager {
    /// Create a manager for the vault described by `config`.
    ///
    /// # Errors
    /// - `Validation` if the configuration is invalid
    pub fn new(
        config: VaultConfig,
        secrets: Arc<dyn SecretStore>,
        directory: Arc<dyn ContactDirectory>,
    ) -> Result<Self> {
        config.validate()?;
        let store = VaultStore::from_config(&config);

        Ok(Self {
            media: MediaVaultManager::new(store.clone()),
            contacts: ContactVaultManager::new(store.clone(), directory),
            backup: BackupExporter::new(store.clone(), config.cache_dir()),
            store,
            secrets,
            config,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Get the vault directory store.
    pub fn store(&self) -> &VaultStore {
        &self.store
    }

    /// Open the master secret gate for a new session.
    pub async fn open_gate(&self) -> Result<MasterPasswordGate> {
        MasterPasswordGate::open(self.secrets.clone(), &self.config).await
    }

    /// Enroll the recovery question used to reset a forgotten secret.
    pub async fn enroll_recovery(
        &self,
        token: &UnlockToken,
        question: &str,
        answer: &str,
    ) -> Result<StoredSecurityQuestion> {
        token.authorize(self.store.root())?;
        StoredSecurityQuestion::enroll(
            &self.secrets,
            &self.config.recovery_key,
            token,
            question,
            answer,
            &self.config.kdf_params,
        )
        .await
    }

    /// Load the enrolled recovery question, if any.
    pub async fn recovery_question(&self) -> Result<Option<StoredSecurityQuestion>> {
        StoredSecurityQuestion::load(&self.secrets, &self.config.recovery_key).await
    }

    pub fn media(&self) -> &MediaVaultManager {
        &self.media
    }

    pub fn contacts(&self) -> &ContactVaultManager {
        &self.contacts
    }

    pub fn backup(&self) -> &BackupExporter {
        &self.backup
    }

    /// Delete everything in the vault.
    pub async fn purge(&self, token: &UnlockToken) -> Result<PurgeOutcome> {
        self.store.purge(token).await
    }

    /// Count hidden photos, videos and contacts.
    pub async fn summary(&self, token: &UnlockToken) -> Result<VaultSummary> {
        let mut summary = VaultSummary::default();
        for item in self.media.list(token).await? {
            match item.kind {
                MediaKind::Photo => summary.photos += 1,
                MediaKind::Video => summary.videos += 1,
            }
        }
        summary.contacts = self.contacts.list(token).await?.len();
        Ok(summary)
    }
}
