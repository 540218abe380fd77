//! Platform capabilities the vault engine depends on.
//!
//! The vault never talks to the platform secure store or the public address
//! book directly. It goes through the [`SecretStore`] and
//! [`ContactDirectory`] traits defined here, so hosts can plug in their own
//! backends.
//!
//! Two sets of implementations ship with the crate:
//! - in-memory providers, for tests and ephemeral sessions
//! - file-backed providers, used by the command-line host

pub mod local;
pub mod memory;
pub mod provider;

pub use local::{FileContactDirectory, FileSecretStore};
pub use memory::{MemoryContactDirectory, MemorySecretStore};
pub use provider::{AccessStatus, ContactDirectory, ContactField, SecretStore, ALL_CONTACT_FIELDS};
