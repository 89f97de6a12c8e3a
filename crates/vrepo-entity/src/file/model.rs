//! Resource entity model.

use serde::{Deserialize, Serialize};
use vrepo_core::RepositoryPath;

use crate::object::EntityInfo;

/// Resource attributes without content, as used in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    /// Identity and audit attributes.
    pub info: EntityInfo,
    /// Whether the content is stored as a binary blob.
    pub binary: bool,
    /// MIME type.
    pub content_type: String,
    /// Number of the version the live content corresponds to.
    pub current_version: i64,
    /// Content length in bytes.
    pub size: i64,
}

impl ResourceMeta {
    /// Full path.
    pub fn path(&self) -> &RepositoryPath {
        &self.info.path
    }
}

/// A resource together with its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Attributes.
    pub meta: ResourceMeta,
    /// Content bytes. Text content is UTF-8.
    pub content: Vec<u8>,
}

impl Resource {
    /// Full path.
    pub fn path(&self) -> &RepositoryPath {
        &self.meta.info.path
    }

    /// Content as text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}
