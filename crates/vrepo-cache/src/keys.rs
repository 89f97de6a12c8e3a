//! Cache key builders.
//!
//! Keys embed the canonical path string, so a subtree is always a key
//! prefix: `obj:/a/b` and everything under `obj:/a/b/`.

use vrepo_core::types::RepositoryPath;

/// Namespace for object (folder or resource metadata) lookups.
const OBJECT: &str = "obj:";

/// Namespace for resources loaded with their content.
const RESOURCE: &str = "res:";

/// Cache key for the object at `path`.
pub fn object(path: &RepositoryPath) -> String {
    format!("{OBJECT}{path}")
}

/// Cache key for the resource (with content) at `path`.
pub fn resource(path: &RepositoryPath) -> String {
    format!("{RESOURCE}{path}")
}

/// Prefixes covering every key strictly below `path`, in both namespaces.
pub fn subtree_prefixes(path: &RepositoryPath) -> [String; 2] {
    let prefix = path.subtree_prefix();
    [format!("{OBJECT}{prefix}"), format!("{RESOURCE}{prefix}")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_use_canonical_path() {
        let path = RepositoryPath::parse("a//b/");
        assert_eq!(object(&path), "obj:/a/b");
        assert_eq!(resource(&path), "res:/a/b");
    }

    #[test]
    fn test_subtree_prefixes() {
        let [obj, res] = subtree_prefixes(&RepositoryPath::parse("/a/b"));
        assert_eq!(obj, "obj:/a/b/");
        assert_eq!(res, "res:/a/b/");
        assert!(!object(&RepositoryPath::parse("/a/bc")).starts_with(&obj));

        let [obj, _] = subtree_prefixes(&RepositoryPath::root());
        assert_eq!(obj, "obj:/");
    }
}
