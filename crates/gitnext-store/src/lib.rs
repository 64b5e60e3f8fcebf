//! Content-addressed object store: blobs are sharded by the first two hex
//! digits of their hash, `<root>/objects/<hex[:2]>/<hex[2:]>`; branch refs
//! are small files under `<root>/refs/<name>` holding the hex hash plus a
//! trailing newline. A `DiskStore` backs a real node; `MemoryStore` backs
//! tests and in-process simulations, mirroring the split the teacher draws
//! between its sqlite and in-memory storage backends.

mod disk;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use gitnext_core::{Blob, Hash};
use gitnext_serializer::{Serializer, SerializerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(Hash),
    #[error("ref not found: {0}")]
    RefNotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serializer(#[from] SerializerError),
    #[error("background task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Marshal and hash `blob` under the active serializer, write it if not
    /// already present, and return its hash. Idempotent: writing the same
    /// logical blob twice is a no-op the second time.
    async fn put(&self, blob: &Blob) -> Result<Hash>;
    /// Fetch and unmarshal the blob stored under `hash`.
    async fn get(&self, hash: &Hash) -> Result<Blob>;
    /// Point branch `name` at `hash`, overwriting any previous value.
    async fn put_ref(&self, name: &str, hash: &Hash) -> Result<()>;
    /// Look up the hash branch `name` currently points at, if any.
    async fn get_ref(&self, name: &str) -> Result<Option<Hash>>;
}

pub use disk::DiskStore;
pub use memory::MemoryStore;

pub(crate) fn shard(hash: &Hash) -> (String, String) {
    let hex = hash.to_hex();
    let (prefix, rest) = hex.split_at(2.min(hex.len()));
    (prefix.to_string(), rest.to_string())
}

pub(crate) type DynSerializer = Arc<dyn Serializer>;
