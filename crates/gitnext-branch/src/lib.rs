mod arbiter;
mod hierarchy;

use gitnext_core::Hash;
use thiserror::Error;

pub use arbiter::{BranchArbiter, BranchArbiterHandle};
pub use hierarchy::{CommitFetcher, CommitHierarchy};

#[derive(Debug, Error)]
pub enum BranchError {
    #[error("object {0} is not a commit")]
    NotACommit(Hash),
    #[error(transparent)]
    Store(#[from] gitnext_store::StoreError),
    #[error("commit {0} could not be fetched from any peer")]
    FetchFailed(Hash),
    #[error("branch arbiter task is no longer running")]
    ArbiterGone,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gitnext_core::{Blob, BranchStatus, CommitBlob};
    use gitnext_serializer::GutSerializer;
    use gitnext_store::{MemoryStore, ObjectStore};
    use std::sync::Arc;

    struct NoFetch;

    #[async_trait]
    impl CommitFetcher for NoFetch {
        async fn fetch_commit(&self, hash: &Hash) -> Result<CommitBlob, BranchError> {
            Err(BranchError::FetchFailed(hash.clone()))
        }
    }

    fn handle(store: Arc<dyn ObjectStore>) -> BranchArbiterHandle {
        let hierarchy = CommitHierarchy::new(store, Arc::new(NoFetch));
        BranchArbiter::spawn(hierarchy)
    }

    async fn commit(store: &dyn ObjectStore, parents: Vec<Hash>, text: &str) -> Hash {
        let tree = store.put(&Blob::tree(vec![])).await.unwrap();
        store
            .put(&Blob::Commit(CommitBlob {
                tree,
                parents,
                text: text.to_string(),
                timestamp: 0,
            }))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_update_on_unknown_branch_is_accepted() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new(Arc::new(GutSerializer)));
        let arbiter = handle(store.clone());
        let c1 = commit(store.as_ref(), vec![], "first").await;
        let accepted = arbiter
            .update(BranchStatus {
                name: "main".into(),
                commit_hash: c1,
            })
            .await
            .unwrap();
        assert!(accepted);
    }

    #[tokio::test]
    async fn fast_forward_is_accepted_diverged_is_rejected() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new(Arc::new(GutSerializer)));
        let arbiter = handle(store.clone());

        let c1 = commit(store.as_ref(), vec![], "first").await;
        arbiter
            .update(BranchStatus {
                name: "main".into(),
                commit_hash: c1.clone(),
            })
            .await
            .unwrap();

        let c2 = commit(store.as_ref(), vec![c1.clone()], "second").await;
        assert!(arbiter
            .update(BranchStatus {
                name: "main".into(),
                commit_hash: c2,
            })
            .await
            .unwrap());

        let diverged = commit(store.as_ref(), vec![c1], "diverged").await;
        assert!(!arbiter
            .update(BranchStatus {
                name: "main".into(),
                commit_hash: diverged,
            })
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn subscribers_receive_accepted_updates() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new(Arc::new(GutSerializer)));
        let arbiter = handle(store.clone());
        let mut rx = arbiter.subscribe().await;

        let c1 = commit(store.as_ref(), vec![], "first").await;
        arbiter
            .update(BranchStatus {
                name: "main".into(),
                commit_hash: c1.clone(),
            })
            .await
            .unwrap();

        let status = rx.recv().await.unwrap();
        assert_eq!(status.commit_hash, c1);
    }
}
