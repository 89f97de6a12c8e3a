//! File version entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vrepo_core::RepositoryPath;

/// An immutable snapshot of a resource's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    /// Path of the owning resource.
    pub path: RepositoryPath,
    /// Sequential version number, starting at 1.
    pub version: i64,
    /// Whether the snapshot is binary.
    pub binary: bool,
    /// MIME type at the time of the snapshot.
    pub content_type: String,
    /// Snapshot content.
    pub content: Vec<u8>,
    /// Who wrote this version.
    pub created_by: String,
    /// When this version was written.
    pub created_at: DateTime<Utc>,
}
