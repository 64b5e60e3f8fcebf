use std::collections::BTreeSet;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use futures::future::{BoxFuture, FutureExt};
use gitnext_core::Hash;
use gitnext_store::{ObjectStore, StoreError};

const FILE_MODE: u32 = 0o644;

/// Write a fetched tree onto disk, overwriting any local file that differs
/// and removing any local file absent from the tree. No three-way merge:
/// the remote tree simply wins.
pub async fn materialize(
    root: &Path,
    store: &dyn ObjectStore,
    tree_hash: &Hash,
) -> Result<(), StoreError> {
    let mut wanted = BTreeSet::new();
    write_tree(root, store, tree_hash, &mut wanted).await?;
    remove_stray_files(root, root, &wanted).await?;
    Ok(())
}

fn write_tree<'a>(
    dir: &'a Path,
    store: &'a dyn ObjectStore,
    tree_hash: &'a Hash,
    wanted: &'a mut BTreeSet<String>,
) -> BoxFuture<'a, Result<(), StoreError>> {
    async move {
        tokio::fs::create_dir_all(dir).await?;
        let blob = store.get(tree_hash).await?;
        let tree = blob
            .as_tree()
            .ok_or_else(|| StoreError::NotFound(tree_hash.clone()))?;
        for entry in &tree.entries {
            let path = dir.join(&entry.name);
            if entry.is_tree() {
                write_tree(&path, store, &entry.hash, wanted).await?;
            } else {
                let file_blob = store.get(&entry.hash).await?;
                let bytes = file_blob
                    .as_file()
                    .ok_or_else(|| StoreError::NotFound(entry.hash.clone()))?;
                tokio::fs::write(&path, &bytes.bytes).await?;
                tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(FILE_MODE)).await?;
                wanted.insert(path.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
    .boxed()
}

fn remove_stray_files<'a>(
    root: &'a Path,
    dir: &'a Path,
    wanted: &'a BTreeSet<String>,
) -> BoxFuture<'a, Result<(), StoreError>> {
    async move {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                remove_stray_files(root, &path, wanted).await?;
            } else if file_type.is_file() {
                let key = path.to_string_lossy().replace('\\', "/");
                if !wanted.contains(&key) {
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }
        let _ = root;
        Ok(())
    }
    .boxed()
}
