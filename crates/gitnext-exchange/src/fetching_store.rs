use std::sync::Arc;

use async_trait::async_trait;
use gitnext_core::{Blob, Hash};
use gitnext_serializer::Serializer;
use gitnext_store::{ObjectStore, Result as StoreResult, StoreError};

use crate::BlobExchangeHandle;

/// Wraps an `ObjectStore` so a local miss falls back to the blob exchange
/// arbiter instead of surfacing `NotFound`, caching whatever comes back.
/// Mirrors the teacher's `CachedBackend<B>` decorator: same trait, an extra
/// layer in front of a plain backend.
pub struct FetchingStore {
    inner: Arc<dyn ObjectStore>,
    exchange: BlobExchangeHandle,
    serializer: Arc<dyn Serializer>,
}

impl FetchingStore {
    pub fn new(
        inner: Arc<dyn ObjectStore>,
        exchange: BlobExchangeHandle,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        Self {
            inner,
            exchange,
            serializer,
        }
    }
}

#[async_trait]
impl ObjectStore for FetchingStore {
    async fn put(&self, blob: &Blob) -> StoreResult<Hash> {
        self.inner.put(blob).await
    }

    async fn get(&self, hash: &Hash) -> StoreResult<Blob> {
        match self.inner.get(hash).await {
            Ok(blob) => Ok(blob),
            Err(StoreError::NotFound(_)) => {
                let bytes = self
                    .exchange
                    .get_blob(hash)
                    .await
                    .map_err(|_| StoreError::NotFound(hash.clone()))?;
                let blob = self.serializer.unmarshal(&bytes)?;
                let _ = self.inner.put(&blob).await;
                Ok(blob)
            }
            Err(e) => Err(e),
        }
    }

    async fn put_ref(&self, name: &str, hash: &Hash) -> StoreResult<()> {
        self.inner.put_ref(name, hash).await
    }

    async fn get_ref(&self, name: &str) -> StoreResult<Option<Hash>> {
        self.inner.get_ref(name).await
    }
}
