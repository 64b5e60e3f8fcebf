//! Commit pipeline: turns a settled tree hash from the watcher into a
//! `Commit` blob chained onto the branch's prior commit, and publishes it
//! through the branch arbiter. Also the other direction: an accepted
//! remote `BranchStatus` is materialized onto disk, a destructive
//! fast-forward with no three-way merge.

mod materialize;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use gitnext_branch::{BranchArbiterHandle, BranchError};
use gitnext_core::{Blob, BranchStatus, CommitBlob, Hash};
use gitnext_store::{ObjectStore, StoreError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub use materialize::materialize;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Branch(#[from] BranchError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configurable commit author, replacing the original's hardcoded identity
/// string.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "gitnextd".to_string(),
            email: "gitnextd@localhost".to_string(),
        }
    }
}

fn format_commit_text(identity: &Identity, timestamp: i64) -> String {
    format!(
        "author {} <{}> {}\nsync\n",
        identity.name, identity.email, timestamp
    )
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Drives both halves of the pipeline for one branch: local tree settles
/// become commits; accepted remote branch updates become local writes.
pub struct CommitPipeline {
    root: PathBuf,
    branch_name: String,
    store: Arc<dyn ObjectStore>,
    branch: BranchArbiterHandle,
    identity: Identity,
}

impl CommitPipeline {
    pub fn new(
        root: impl Into<PathBuf>,
        branch_name: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        branch: BranchArbiterHandle,
        identity: Identity,
    ) -> Self {
        Self {
            root: root.into(),
            branch_name: branch_name.into(),
            store,
            branch,
            identity,
        }
    }

    /// Run until either input channel closes (node shutdown), consuming
    /// settled tree hashes from the watcher and accepted branch updates
    /// from the arbiter.
    pub async fn run(
        self,
        mut tree_hashes: mpsc::Receiver<Hash>,
        mut remote_updates: mpsc::Receiver<BranchStatus>,
    ) {
        let mut last: Option<Hash> = self.store.get_ref(&self.branch_name).await.ok().flatten();

        loop {
            tokio::select! {
                maybe_tree = tree_hashes.recv() => {
                    let Some(tree) = maybe_tree else { break };
                    if let Err(e) = self.commit_tree(tree, &mut last).await {
                        warn!(error = %e, "failed to commit settled tree");
                    }
                }
                maybe_remote = remote_updates.recv() => {
                    let Some(status) = maybe_remote else { break };
                    if Some(&status.commit_hash) == last.as_ref() {
                        continue;
                    }
                    if let Err(e) = self.apply_remote(status, &mut last).await {
                        warn!(error = %e, "failed to apply remote branch update");
                    }
                }
            }
        }
    }

    async fn commit_tree(&self, tree: Hash, last: &mut Option<Hash>) -> Result<(), CommitError> {
        let timestamp = now_unix();
        let parents = last.iter().cloned().collect::<Vec<_>>();
        let commit = CommitBlob {
            tree,
            parents,
            text: format_commit_text(&self.identity, timestamp),
            timestamp,
        };
        let hash = self.store.put(&Blob::Commit(commit)).await?;
        self.store.put_ref(&self.branch_name, &hash).await?;
        let accepted = self
            .branch
            .update(BranchStatus {
                name: self.branch_name.clone(),
                commit_hash: hash.clone(),
            })
            .await?;
        if accepted {
            info!(branch = %self.branch_name, commit = %hash, "committed local change");
            *last = Some(hash);
        }
        Ok(())
    }

    async fn apply_remote(&self, status: BranchStatus, last: &mut Option<Hash>) -> Result<(), CommitError> {
        let blob = self.store.get(&status.commit_hash).await?;
        let commit = blob
            .as_commit()
            .ok_or_else(|| StoreError::NotFound(status.commit_hash.clone()))?;
        materialize(&self.root, self.store.as_ref(), &commit.tree).await?;
        self.store
            .put_ref(&self.branch_name, &status.commit_hash)
            .await?;
        info!(branch = %status.name, commit = %status.commit_hash, "fast-forwarded working tree");
        *last = Some(status.commit_hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitnext_branch::{BranchArbiter, CommitHierarchy};
    use gitnext_core::TreeEntry;
    use gitnext_serializer::GutSerializer;
    use gitnext_store::MemoryStore;
    use std::sync::Arc;

    struct NeverFetch;

    #[async_trait::async_trait]
    impl gitnext_branch::CommitFetcher for NeverFetch {
        async fn fetch_commit(&self, hash: &Hash) -> Result<CommitBlob, BranchError> {
            Err(BranchError::FetchFailed(hash.clone()))
        }
    }

    fn pipeline(root: PathBuf, store: Arc<dyn ObjectStore>) -> CommitPipeline {
        let hierarchy = CommitHierarchy::new(store.clone(), Arc::new(NeverFetch));
        let branch = BranchArbiter::spawn(hierarchy);
        CommitPipeline::new(root, "main", store, branch, Identity::default())
    }

    #[tokio::test]
    async fn first_commit_has_no_parent() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new(Arc::new(GutSerializer)));
        let mut last = None;
        let p = pipeline(dir.path().to_path_buf(), store.clone());
        let tree = store.put(&Blob::tree(vec![])).await.unwrap();
        p.commit_tree(tree.clone(), &mut last).await.unwrap();
        let hash = last.unwrap();
        let blob = store.get(&hash).await.unwrap();
        assert!(blob.as_commit().unwrap().parents.is_empty());
        assert_eq!(blob.as_commit().unwrap().tree, tree);
    }

    #[tokio::test]
    async fn materialize_writes_files_and_removes_strays() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new(Arc::new(GutSerializer)));

        tokio::fs::write(dir.path().join("stale.txt"), b"old").await.unwrap();

        let file_hash = store.put(&Blob::file(b"content".to_vec())).await.unwrap();
        let tree_hash = store
            .put(&Blob::tree(vec![TreeEntry::file("kept.txt", file_hash)]))
            .await
            .unwrap();

        materialize(dir.path(), store.as_ref(), &tree_hash).await.unwrap();

        assert!(!dir.path().join("stale.txt").exists());
        let kept = tokio::fs::read(dir.path().join("kept.txt")).await.unwrap();
        assert_eq!(kept, b"content");
    }
}
