//! Attributes shared by folders and resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vrepo_core::RepositoryPath;

use crate::file::ResourceMeta;
use crate::folder::Folder;

/// Kind of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// A container of folders and resources.
    Folder,
    /// A leaf holding content.
    Resource,
}

impl ObjectKind {
    /// Numeric code stored in the registry table.
    pub fn code(self) -> i64 {
        match self {
            Self::Folder => 0,
            Self::Resource => 1,
        }
    }

    /// Parse a stored numeric code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Folder),
            1 => Some(Self::Resource),
            _ => None,
        }
    }
}

/// Audit and identity attributes common to every entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    /// Last path segment.
    pub name: String,
    /// Full path.
    pub path: RepositoryPath,
    /// Who created the entity.
    pub created_by: String,
    /// When the entity was created.
    pub created_at: DateTime<Utc>,
    /// Who last modified the entity.
    pub modified_by: String,
    /// When the entity was last modified.
    pub modified_at: DateTime<Utc>,
}

impl EntityInfo {
    /// Fresh audit attributes for an entity created now by `user`.
    pub fn new(path: RepositoryPath, user: &str, at: DateTime<Utc>) -> Self {
        Self {
            name: path.last_segment().to_string(),
            path,
            created_by: user.to_string(),
            created_at: at,
            modified_by: user.to_string(),
            modified_at: at,
        }
    }
}

/// Either kind of entity, as returned by lookups, listings, and searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RepositoryObject {
    /// A folder.
    Folder(Folder),
    /// A resource, without its content.
    Resource(ResourceMeta),
}

impl RepositoryObject {
    /// Shared attributes.
    pub fn info(&self) -> &EntityInfo {
        match self {
            Self::Folder(f) => &f.info,
            Self::Resource(r) => &r.info,
        }
    }

    /// Full path.
    pub fn path(&self) -> &RepositoryPath {
        &self.info().path
    }

    /// Entity kind.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Folder(_) => ObjectKind::Folder,
            Self::Resource(_) => ObjectKind::Resource,
        }
    }

    /// Whether this is a folder.
    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder(_))
    }
}
