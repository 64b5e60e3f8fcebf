//! Watches a directory tree, persists changed file contents as File blobs,
//! and rebuilds the nested Tree blob for the whole watched root after each
//! debounced settle. Mirrors the original `MonitorTree`/`WatchTree` pair,
//! collapsed into a single actor that recomputes the tree in-memory rather
//! than spawning one actor per subtree.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use gitnext_core::{Blob, Hash, TreeEntry};
use gitnext_store::ObjectStore;
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::debounce::Debouncer;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error(transparent)]
    Notify(#[from] notify::Error),
    #[error(transparent)]
    Store(#[from] gitnext_store::StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Watches `root` and, through the channel returned by `start`, emits a new
/// root tree hash every time a debounced batch of filesystem changes
/// settles. The commit pipeline consumes that stream.
pub struct TreeMonitor {
    root: PathBuf,
    store: Arc<dyn ObjectStore>,
    debounce: Duration,
}

impl TreeMonitor {
    pub fn new(root: impl Into<PathBuf>, store: Arc<dyn ObjectStore>, debounce: Duration) -> Self {
        Self {
            root: root.into(),
            store,
            debounce,
        }
    }

    /// Enumerate the tree once, build its initial root hash, start the
    /// filesystem watcher, and return a channel yielding the new root hash
    /// after every debounced batch of changes.
    pub async fn start(self) -> Result<mpsc::Receiver<Hash>, WatchError> {
        let mut files = BTreeSet::new();
        enumerate_initial(&self.root, &self.root, &mut files).await?;

        let store = self.store.clone();
        let root = self.root.clone();
        let (raw_tx, raw_rx) = mpsc::channel::<String>(1024);
        let (debounced_tx, debounced_rx) = mpsc::channel::<String>(1024);
        let debouncer = Debouncer::new(raw_rx, debounced_tx, self.debounce);
        tokio::spawn(debouncer.run());

        let watch_root = self.root.clone();
        let watcher_task = std::thread::spawn(move || -> Result<(), notify::Error> {
            let (tx, rx) = std::sync::mpsc::channel();
            let mut watcher = notify::recommended_watcher(move |res| {
                let _ = tx.send(res);
            })?;
            watcher.watch(&watch_root, RecursiveMode::Recursive)?;
            for res in rx {
                match res {
                    Ok(event) => {
                        for path in event.paths {
                            if let Ok(rel) = path.strip_prefix(&watch_root) {
                                if let Some(rel_str) = rel.to_str() {
                                    let _ = raw_tx.blocking_send(rel_str.replace('\\', "/"));
                                }
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "filesystem watch error"),
                }
            }
            Ok(())
        });
        std::mem::forget(watcher_task);

        let (out_tx, out_rx) = mpsc::channel(16);
        let root_hash = rebuild(&root, &files, store.as_ref()).await?;
        let _ = out_tx.send(root_hash.clone()).await;

        tokio::spawn(settle_loop(root, store, files, debounced_rx, out_tx, root_hash));
        Ok(out_rx)
    }
}

/// Consumes debounced path settlements and re-emits the root tree hash only
/// when it actually changed. Without this guard, the filesystem events a
/// `materialize()` write produces would settle here, rebuild to the
/// identical hash, and still be forwarded — the commit pipeline would then
/// chain a redundant commit onto the one it just applied, and the branch
/// arbiter would accept it as a fast-forward, ping-ponging the two peers
/// forever. Deduping here is what the design note's guard (a) relies on.
async fn settle_loop(
    root: PathBuf,
    store: Arc<dyn ObjectStore>,
    mut files: BTreeSet<String>,
    mut debounced: mpsc::Receiver<String>,
    out: mpsc::Sender<Hash>,
    mut last_sent: Hash,
) {
    while let Some(rel) = debounced.recv().await {
        let abs = root.join(&rel);
        match tokio::fs::try_exists(&abs).await {
            Ok(true) => {
                files.insert(rel.clone());
                debug!(path = %rel, "file updated");
            }
            Ok(false) => {
                files.remove(&rel);
                debug!(path = %rel, "file removed");
            }
            Err(e) => {
                warn!(path = %rel, error = %e, "failed to stat changed file, treating as delete");
                files.remove(&rel);
            }
        }

        match rebuild(&root, &files, store.as_ref()).await {
            Ok(hash) => {
                if hash == last_sent {
                    continue;
                }
                last_sent = hash.clone();
                if out.send(hash).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "failed to rebuild tree"),
        }
    }
}

async fn enumerate_initial(
    root: &Path,
    dir: &Path,
    files: &mut BTreeSet<String>,
) -> Result<(), WatchError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            Box::pin(enumerate_initial(root, &path, files)).await?;
        } else if file_type.is_file() {
            let rel = path
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            files.insert(rel);
        }
    }
    Ok(())
}

/// Rebuild every Tree blob bottom-up from the current set of known file
/// paths and return the new root hash. Paths are grouped by their first
/// remaining component at each level, matching `TreeBlob`'s own sorted
/// layout so two peers with the same file contents always agree on the
/// hash. Unconditionally re-reads and re-`put`s every leaf: the store's
/// `put` is already a content-addressed no-op for unchanged bytes, so this
/// trades a pass over the tree for not having to track per-node staleness.
fn rebuild<'a>(
    root: &'a Path,
    files: &'a BTreeSet<String>,
    store: &'a dyn ObjectStore,
) -> BoxFuture<'a, Result<Hash, WatchError>> {
    async move {
        let mut grouped: Vec<(String, bool, BTreeSet<String>)> = Vec::new();
        for path in files {
            match path.split_once('/') {
                None => grouped.push((path.clone(), true, BTreeSet::new())),
                Some((head, rest)) => {
                    if let Some(entry) = grouped.iter_mut().find(|(name, is_leaf, _)| name == head && !is_leaf) {
                        entry.2.insert(rest.to_string());
                    } else {
                        let mut sub = BTreeSet::new();
                        sub.insert(rest.to_string());
                        grouped.push((head.to_string(), false, sub));
                    }
                }
            }
        }

        let mut entries = Vec::new();
        for (name, is_leaf, sub) in grouped {
            if is_leaf {
                match tokio::fs::read(root.join(&name)).await {
                    Ok(bytes) => {
                        let hash = store.put(&Blob::file(bytes)).await?;
                        entries.push(TreeEntry::file(name, hash));
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        debug!(path = %name, "file vanished mid-read, treating as delete");
                    }
                    Err(e) => return Err(e.into()),
                }
            } else {
                let sub_hash = rebuild(&root.join(&name), &sub, store).await?;
                entries.push(TreeEntry::tree(name, sub_hash));
            }
        }

        let hash = store.put(&Blob::tree(entries)).await?;
        Ok(hash)
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitnext_serializer::GutSerializer;
    use gitnext_store::MemoryStore;
    use std::time::Duration as StdDuration;

    async fn tree_names(store: &dyn ObjectStore, hash: &Hash) -> Vec<String> {
        let blob = store.get(hash).await.unwrap();
        blob.as_tree()
            .unwrap()
            .entries
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    #[tokio::test]
    async fn initial_enumeration_reproduces_pre_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"hello").await.unwrap();
        tokio::fs::write(dir.path().join("b.txt"), b"world").await.unwrap();

        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new(Arc::new(GutSerializer)));
        let mut rx = TreeMonitor::new(dir.path(), store.clone(), StdDuration::from_millis(5))
            .start()
            .await
            .unwrap();

        let hash = rx.recv().await.unwrap();
        let mut names = tree_names(store.as_ref(), &hash).await;
        names.sort();
        assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[tokio::test]
    async fn a_new_file_settles_into_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new(Arc::new(GutSerializer)));
        let mut rx = TreeMonitor::new(dir.path(), store.clone(), StdDuration::from_millis(5))
            .start()
            .await
            .unwrap();

        let empty_hash = rx.recv().await.unwrap();
        assert!(tree_names(store.as_ref(), &empty_hash).await.is_empty());

        tokio::fs::write(dir.path().join("new.txt"), b"content").await.unwrap();
        let updated = tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tree_names(store.as_ref(), &updated).await, vec!["new.txt".to_string()]);
    }
}
