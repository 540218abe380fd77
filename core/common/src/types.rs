//! Data model shared by the vault engine and its storage providers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// File extensions classified as video. Everything else is a photo.
const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4"];

/// Kind of a media file held in the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Classify a file by the extension of its name.
    ///
    /// The comparison ignores case, so `clip.MP4` is a video.
    pub fn from_file_name(name: &str) -> Self {
        let is_video = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                VIDEO_EXTENSIONS
                    .iter()
                    .any(|video| ext.eq_ignore_ascii_case(video))
            })
            .unwrap_or(false);

        if is_video {
            MediaKind::Video
        } else {
            MediaKind::Photo
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Photo => write!(f, "photo"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// A media file living directly under the vault directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// File name, unique within the vault.
    pub id: String,
    /// Full path of the file.
    pub path: PathBuf,
    /// Derived from `id` at enumeration time.
    pub kind: MediaKind,
}

impl MediaItem {
    /// Build an item for a file in the vault, classifying it by name.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let id = path.file_name()?.to_str()?.to_string();
        let kind = MediaKind::from_file_name(&id);
        Some(Self { id, path, kind })
    }
}

/// An address-book entry, as held by the public directory or the vault.
///
/// `vault_path` is never serialized; it is attached after a vault read so
/// the entry can later be restored and its vault copy removed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    /// Identifier assigned by the address book.
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone_numbers: Vec<String>,
    #[serde(skip)]
    pub vault_path: Option<PathBuf>,
}

impl ContactRecord {
    /// Create a record that has not been assigned an identifier yet.
    pub fn new(name: impl Into<String>, phone_numbers: Vec<String>) -> Self {
        Self {
            external_id: None,
            name: name.into(),
            phone_numbers,
            vault_path: None,
        }
    }

    /// Attach an address-book identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    /// Name suitable for display, falling back when the entry has none.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "(no name)"
        } else {
            &self.name
        }
    }
}

/// One item that failed inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub id: String,
    pub reason: String,
}

/// Outcome of a batch that isolates failures per item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    pub attempted: usize,
    pub succeeded: usize,
    /// Failures in the order the items were processed.
    pub failures: Vec<ItemFailure>,
}

/// Result of hiding several contacts at once.
pub type BulkHideResult = BulkResult;

impl BulkResult {
    /// Record a successful item.
    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    /// Record a failed item.
    pub fn record_failure(&mut self, id: impl Into<String>, reason: impl fmt::Display) {
        self.attempted += 1;
        self.failures.push(ItemFailure {
            id: id.into(),
            reason: reason.to_string(),
        });
    }

    /// Whether every attempted item succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
