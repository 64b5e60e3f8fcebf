use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gitnext_core::{Blob, Hash};

use crate::{shard, DynSerializer, ObjectStore, Result, StoreError};

pub struct DiskStore {
    root: PathBuf,
    serializer: DynSerializer,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>, serializer: DynSerializer) -> Self {
        Self {
            root: root.into(),
            serializer,
        }
    }

    fn object_path(&self, hash: &Hash) -> PathBuf {
        let (prefix, rest) = shard(hash);
        self.root.join("objects").join(prefix).join(rest)
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.root.join("refs").join("heads").join(name)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}

#[async_trait]
impl ObjectStore for DiskStore {
    async fn put(&self, blob: &Blob) -> Result<Hash> {
        let hash = self.serializer.hash(blob)?;
        let path = self.object_path(&hash);
        if tokio::fs::metadata(&path).await.is_ok() {
            return Ok(hash);
        }
        let bytes = self.serializer.marshal(blob)?;
        tokio::task::spawn_blocking(move || write_file(&path, &bytes)).await??;
        Ok(hash)
    }

    async fn get(&self, hash: &Hash) -> Result<Blob> {
        let path = self.object_path(hash);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(hash.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.serializer.unmarshal(&bytes)?)
    }

    async fn put_ref(&self, name: &str, hash: &Hash) -> Result<()> {
        let path = self.ref_path(name);
        let contents = format!("{}\n", hash.to_hex()).into_bytes();
        tokio::task::spawn_blocking(move || write_file(&path, &contents)).await??;
        Ok(())
    }

    async fn get_ref(&self, name: &str) -> Result<Option<Hash>> {
        let path = self.ref_path(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(Hash::from_hex(contents.trim()).map_err(|e| {
                StoreError::Serializer(gitnext_serializer::SerializerError::Malformed(
                    e.to_string(),
                ))
            })?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitnext_serializer::GutSerializer;
    use std::sync::Arc;

    fn store() -> (tempfile::TempDir, DiskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path(), Arc::new(GutSerializer));
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (_dir, store) = store();
        let blob = Blob::file(b"hello world".to_vec());
        let hash = store.put(&blob).await.unwrap();
        let fetched = store.get(&hash).await.unwrap();
        assert_eq!(fetched, blob);
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let (_dir, store) = store();
        let blob = Blob::file(b"same bytes".to_vec());
        let h1 = store.put(&blob).await.unwrap();
        let h2 = store.put(&blob).await.unwrap();
        assert_eq!(h1, h2);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_dir, store) = store();
        let bogus = Hash::from_bytes(vec![0u8; 20]);
        assert!(matches!(store.get(&bogus).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn refs_round_trip_and_default_to_none() {
        let (_dir, store) = store();
        assert!(store.get_ref("main").await.unwrap().is_none());
        let blob = Blob::file(b"ref target".to_vec());
        let hash = store.put(&blob).await.unwrap();
        store.put_ref("main", &hash).await.unwrap();
        assert_eq!(store.get_ref("main").await.unwrap(), Some(hash));
    }
}
