//! Folder entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vrepo_core::RepositoryPath;

use crate::object::EntityInfo;

/// A container in the repository hierarchy.
///
/// Children are not held here; list them through the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Identity and audit attributes.
    pub info: EntityInfo,
}

impl Folder {
    /// The implicit root folder, which is never stored.
    pub fn root(at: DateTime<Utc>) -> Self {
        Self {
            info: EntityInfo {
                name: String::new(),
                path: RepositoryPath::root(),
                created_by: String::new(),
                created_at: at,
                modified_by: String::new(),
                modified_at: at,
            },
        }
    }

    /// Full path.
    pub fn path(&self) -> &RepositoryPath {
        &self.info.path
    }

    /// Whether this is the root folder.
    pub fn is_root(&self) -> bool {
        self.info.path.is_root()
    }
}
