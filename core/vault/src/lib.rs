//! Vault engine for Cofre.
//!
//! This module provides:
//! - The master secret gate and recovery challenges
//! - The vault directory store with atomic moves in and out
//! - Media and contact de-listing with restore
//! - Backup bundles for export and import
//!
//! # Architecture
//! Every vault operation takes an [`UnlockToken`], which only the
//! [`MasterPasswordGate`] can issue. The host supplies the secret store and
//! the address book as capability objects from `cofre-storage`.

pub mod backup;
pub mod config;
pub mod contacts;
pub mod gate;
pub mod manager;
pub mod media;
pub mod recovery;
pub mod session;
pub mod store;

pub use backup::{BackupBundle, BackupEntry, BackupEntryKind, BackupExporter};
pub use config::{CollisionPolicy, VaultConfig};
pub use contacts::ContactVaultManager;
pub use gate::{GateState, MasterPasswordGate};
pub use manager::{VaultManager, VaultSummary};
pub use media::MediaVaultManager;
pub use recovery::{normalize_answer, RecoveryChallenge, SecurityQuestion, StoredSecurityQuestion};
pub use session::{SessionHandle, UnlockToken};
pub use store::{PurgeOutcome, VaultEntry, VaultStore};
