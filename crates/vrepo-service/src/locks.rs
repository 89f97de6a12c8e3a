//! Striped per-path write locks.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};

use vrepo_core::types::RepositoryPath;

/// Default number of stripes.
pub const DEFAULT_STRIPES: usize = 64;

/// A fixed set of async mutexes that paths hash onto.
///
/// Two writers to the same path always contend on the same stripe.
/// Unrelated paths may share a stripe, which only costs some
/// parallelism. Multi-path callers take stripes in index order, so lock
/// acquisition cannot deadlock.
#[derive(Debug)]
pub struct PathLocks {
    stripes: Vec<Mutex<()>>,
}

/// Holds the stripes of one or more paths until dropped.
#[derive(Debug)]
pub struct PathGuard<'a> {
    _guards: Vec<MutexGuard<'a, ()>>,
}

impl PathLocks {
    /// Create a lock set with `stripes` mutexes (at least one).
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Lock the stripe of `path`.
    pub async fn lock(&self, path: &RepositoryPath) -> PathGuard<'_> {
        self.lock_all(&[path]).await
    }

    /// Lock the stripes of every path in `paths`.
    pub async fn lock_all(&self, paths: &[&RepositoryPath]) -> PathGuard<'_> {
        let mut indexes: Vec<usize> = paths.iter().map(|p| self.stripe(p)).collect();
        indexes.sort_unstable();
        indexes.dedup();

        let mut guards = Vec::with_capacity(indexes.len());
        for index in indexes {
            guards.push(self.stripes[index].lock().await);
        }
        PathGuard { _guards: guards }
    }

    fn stripe(&self, path: &RepositoryPath) -> usize {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}

impl Default for PathLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_path_is_serialized() {
        let locks = Arc::new(PathLocks::default());
        let path = RepositoryPath::parse("/a/file.txt");
        let guard = locks.lock(&path).await;

        let contender = {
            let locks = locks.clone();
            let path = path.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&path).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_all_tolerates_shared_stripe() {
        let locks = PathLocks::new(1);
        let a = RepositoryPath::parse("/a");
        let b = RepositoryPath::parse("/b");
        let guard = locks.lock_all(&[&a, &b, &a]).await;
        assert_eq!(guard._guards.len(), 1);
    }

    #[test]
    fn test_equivalent_paths_share_a_stripe() {
        let locks = PathLocks::default();
        assert_eq!(
            locks.stripe(&RepositoryPath::parse("/a//b/")),
            locks.stripe(&RepositoryPath::parse("a/b"))
        );
    }
}
