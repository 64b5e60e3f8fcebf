use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use gitnext_core::{CommitBlob, Hash};
use gitnext_store::ObjectStore;

use crate::BranchError;

/// Pulls a commit not yet present in the local object store. Implemented by
/// the blob exchange arbiter's client handle; kept as a trait here so this
/// crate never needs a dependency edge onto the exchange crate.
#[async_trait]
pub trait CommitFetcher: Send + Sync {
    async fn fetch_commit(&self, hash: &Hash) -> Result<CommitBlob, BranchError>;
}

/// Answers ancestry queries by walking `Commit.parents` links, fetching any
/// commit missing from the local store on demand. The original Go arbiter
/// never asked this question at all (first update wins); this service is
/// what lets the branch arbiter reject non-fast-forward updates instead of
/// silently clobbering diverged history.
pub struct CommitHierarchy {
    store: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn CommitFetcher>,
}

impl CommitHierarchy {
    pub fn new(store: Arc<dyn ObjectStore>, fetcher: Arc<dyn CommitFetcher>) -> Self {
        Self { store, fetcher }
    }

    async fn commit(&self, hash: &Hash) -> Result<CommitBlob, BranchError> {
        match self.store.get(hash).await {
            Ok(blob) => blob
                .as_commit()
                .cloned()
                .ok_or_else(|| BranchError::NotACommit(hash.clone())),
            Err(gitnext_store::StoreError::NotFound(_)) => self.fetcher.fetch_commit(hash).await,
            Err(e) => Err(e.into()),
        }
    }

    /// True if `candidate` is `ancestor`, or descends from it through one or
    /// more parent links.
    pub async fn descends_from(&self, candidate: &Hash, ancestor: &Hash) -> Result<bool, BranchError> {
        if candidate == ancestor {
            return Ok(true);
        }
        let mut queue = vec![candidate.clone()];
        let mut visited: HashSet<Hash> = HashSet::new();

        while let Some(hash) = queue.pop() {
            if !visited.insert(hash.clone()) {
                continue;
            }
            if &hash == ancestor {
                return Ok(true);
            }
            let commit = self.commit(&hash).await?;
            for parent in commit.parents {
                if !visited.contains(&parent) {
                    queue.push(parent);
                }
            }
        }
        Ok(false)
    }
}
