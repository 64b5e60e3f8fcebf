use async_trait::async_trait;
use dashmap::DashMap;
use gitnext_core::{Blob, Hash};

use crate::{DynSerializer, ObjectStore, Result, StoreError};

/// In-process backend for tests and single-node simulations; never touches
/// the filesystem.
pub struct MemoryStore {
    objects: DashMap<Hash, Vec<u8>>,
    refs: DashMap<String, Hash>,
    serializer: DynSerializer,
}

impl MemoryStore {
    pub fn new(serializer: DynSerializer) -> Self {
        Self {
            objects: DashMap::new(),
            refs: DashMap::new(),
            serializer,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, blob: &Blob) -> Result<Hash> {
        let hash = self.serializer.hash(blob)?;
        if !self.objects.contains_key(&hash) {
            let bytes = self.serializer.marshal(blob)?;
            self.objects.insert(hash.clone(), bytes);
        }
        Ok(hash)
    }

    async fn get(&self, hash: &Hash) -> Result<Blob> {
        let bytes = self
            .objects
            .get(hash)
            .ok_or_else(|| StoreError::NotFound(hash.clone()))?;
        Ok(self.serializer.unmarshal(&bytes)?)
    }

    async fn put_ref(&self, name: &str, hash: &Hash) -> Result<()> {
        self.refs.insert(name.to_string(), hash.clone());
        Ok(())
    }

    async fn get_ref(&self, name: &str) -> Result<Option<Hash>> {
        Ok(self.refs.get(name).map(|h| h.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitnext_serializer::ProtoSerializer;
    use std::sync::Arc;

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(ProtoSerializer))
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = store();
        let blob = Blob::file(b"in memory".to_vec());
        let hash = store.put(&blob).await.unwrap();
        assert_eq!(store.get(&hash).await.unwrap(), blob);
    }

    #[tokio::test]
    async fn unknown_ref_is_none() {
        let store = store();
        assert_eq!(store.get_ref("does-not-exist").await.unwrap(), None);
    }
}
