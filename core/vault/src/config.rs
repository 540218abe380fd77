//! Vault configuration and on-disk layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use cofre_common::{Error, Result};
use cofre_crypto::KdfParams;

/// Vault directory name under the app-private root.
pub const VAULT_DIRNAME: &str = "CofreSeguro";

/// Secret store key holding the master secret verifier.
pub const SECRET_KEY: &str = "userPassword";

/// Secret store key holding the recovery answer verifier.
pub const RECOVERY_KEY: &str = "chave_secreta_recuperacao";

/// Minimum master secret length, in characters.
pub const MIN_SECRET_LENGTH: usize = 4;

/// File name prefix of serialized contacts.
pub const CONTACT_PREFIX: &str = "contato_";

/// File name suffix of serialized contacts.
pub const CONTACT_SUFFIX: &str = ".json";

/// File name of the export artifact.
pub const BACKUP_FILENAME: &str = "AgendaSegura_Backup_Seguro.json";

/// Suffix of files being copied into the vault.
pub const PARTIAL_SUFFIX: &str = ".cofre-partial";

/// What `move_in` does when the vault already holds a file with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Append `-1`, `-2`, ... to the file stem until the name is free.
    #[default]
    Rename,
    /// Fail with `AlreadyExists`.
    Reject,
    /// Replace the existing file (last write wins).
    Overwrite,
}

/// Vault configuration.
///
/// Missing fields fall back to their defaults when loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// App-private storage root.
    pub app_root: PathBuf,
    /// Name of the vault directory under `app_root`.
    pub vault_dirname: String,
    /// Shareable cache location for export artifacts and import staging.
    /// Defaults to `<app_root>/cache`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Secret store key of the master secret.
    pub secret_key: String,
    /// Secret store key of the recovery answer.
    pub recovery_key: String,
    /// Minimum master secret length.
    pub min_secret_length: usize,
    /// Name collision handling for `move_in`.
    pub collision_policy: CollisionPolicy,
    /// KDF parameters for new verifiers.
    pub kdf_params: KdfParams,
}

impl VaultConfig {
    /// Create a configuration with defaults rooted at `app_root`.
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        let app_root = app_root.into();
        Self {
            app_root,
            cache_dir: None,
            vault_dirname: VAULT_DIRNAME.to_string(),
            secret_key: SECRET_KEY.to_string(),
            recovery_key: RECOVERY_KEY.to_string(),
            min_secret_length: MIN_SECRET_LENGTH,
            collision_policy: CollisionPolicy::default(),
            kdf_params: KdfParams::default(),
        }
    }

    /// Set the collision policy.
    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    /// Set the KDF parameters.
    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }

    /// Full path of the vault directory.
    pub fn vault_dir(&self) -> PathBuf {
        self.app_root.join(&self.vault_dirname)
    }

    /// Directory receiving export artifacts.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.app_root.join("cache"))
    }

    /// Check the configuration for values the vault cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.vault_dirname.is_empty()
            || self.vault_dirname.contains('/')
            || self.vault_dirname.contains('\\')
        {
            return Err(Error::Validation(format!(
                "Invalid vault directory name: {:?}",
                self.vault_dirname
            )));
        }
        if self.secret_key.is_empty() || self.recovery_key.is_empty() {
            return Err(Error::Validation("Secret store keys cannot be empty".to_string()));
        }
        if self.secret_key == self.recovery_key {
            return Err(Error::Validation(
                "Secret and recovery keys must differ".to_string(),
            ));
        }
        if self.min_secret_length == 0 {
            return Err(Error::Validation(
                "Minimum secret length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// Save configuration to a JSON file.
    pub async fn save(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("."))
    }
}

/// Vault file name of a serialized contact.
pub fn contact_file_name(id: &str) -> String {
    format!("{}{}{}", CONTACT_PREFIX, id, CONTACT_SUFFIX)
}

/// Whether a vault file name holds a serialized contact.
pub fn is_contact_file(name: &str) -> bool {
    name.starts_with(CONTACT_PREFIX) && name.ends_with(CONTACT_SUFFIX)
}
