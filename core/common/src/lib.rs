//! Common types shared across the Cofre crates.
//!
//! This crate holds the error taxonomy every vault operation reports through
//! and the small data model (media items, contact records, batch results)
//! that the storage providers and the vault engine exchange.

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::{BulkHideResult, BulkResult, ContactRecord, ItemFailure, MediaItem, MediaKind};
