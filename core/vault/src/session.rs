//! Session handles and unlock tokens.
//!
//! An [`UnlockToken`] is the proof that the master secret was created or
//! verified in the current session. It can only be minted by
//! [`MasterPasswordGate`](crate::gate::MasterPasswordGate), and every vault
//! operation takes one, so no vault call can run before the gate opens.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use cofre_common::{Error, Result};

/// Session handle for tracking the current app session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Generate a new unique session handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the handle string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that the gate is unlocked for one vault.
///
/// The fields are private and the constructor is crate-local, so code
/// outside this crate can only obtain a token from the gate.
#[derive(Debug, Clone)]
pub struct UnlockToken {
    session: SessionHandle,
    vault_dir: PathBuf,
    issued_at: DateTime<Utc>,
}

impl UnlockToken {
    pub(crate) fn issue(session: &SessionHandle, vault_dir: &Path) -> Self {
        Self {
            session: session.clone(),
            vault_dir: vault_dir.to_path_buf(),
            issued_at: Utc::now(),
        }
    }

    /// Session the token was issued in.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// When the gate was unlocked.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Check that this token opens the vault at `vault_dir`.
    ///
    /// # Errors
    /// - `Auth` if the token was issued for another vault
    pub(crate) fn authorize(&self, vault_dir: &Path) -> Result<()> {
        if self.vault_dir != vault_dir {
            return Err(Error::Auth(
                "Unlock token was issued for a different vault".to_string(),
            ));
        }
        Ok(())
    }
}
