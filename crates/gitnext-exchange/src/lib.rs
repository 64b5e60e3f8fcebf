//! Blob exchange arbiter: multiplexes outstanding fetches for the same hash
//! onto a single outbound request, and tolerates blobs arriving that nobody
//! asked for (a peer may push one speculatively, or two concurrent fetches
//! may both be satisfied by one delivery). One actor task, no locks.

mod fetching_store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use gitnext_branch::CommitFetcher;
use gitnext_branch::BranchError;
use gitnext_core::{CommitBlob, Hash};
use gitnext_serializer::Serializer;
use gitnext_store::ObjectStore;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub use fetching_store::FetchingStore;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("timed out waiting for blob {0}")]
    Timeout(Hash),
    #[error("exchange arbiter task is no longer running")]
    ArbiterGone,
}

enum Command {
    RegisterServicer(mpsc::Sender<Hash>),
    Request(Hash, oneshot::Sender<Bytes>),
    Deliver(Hash, Bytes),
}

pub struct BlobExchangeArbiter {
    commands: mpsc::Receiver<Command>,
}

#[derive(Clone)]
pub struct BlobExchangeHandle {
    commands: mpsc::Sender<Command>,
    default_timeout: Duration,
}

impl BlobExchangeArbiter {
    pub fn spawn(default_timeout: Duration) -> BlobExchangeHandle {
        let (tx, rx) = mpsc::channel(1024);
        let arbiter = BlobExchangeArbiter { commands: rx };
        tokio::spawn(arbiter.run());
        BlobExchangeHandle {
            commands: tx,
            default_timeout,
        }
    }

    async fn run(mut self) {
        let mut waiters: HashMap<Hash, Vec<oneshot::Sender<Bytes>>> = HashMap::new();
        let mut servicers: Vec<mpsc::Sender<Hash>> = Vec::new();

        while let Some(cmd) = self.commands.recv().await {
            match cmd {
                Command::RegisterServicer(tx) => {
                    debug!(servicers = servicers.len() + 1, "peer registered as a blob servicer");
                    servicers.push(tx);
                }
                Command::Request(hash, reply) => {
                    let should_broadcast = !waiters.contains_key(&hash);
                    waiters.entry(hash.clone()).or_default().push(reply);
                    if should_broadcast {
                        servicers.retain(|tx| !tx.is_closed());
                        debug!(hash = %hash, servicers = servicers.len(), "blob requested");
                        for tx in &servicers {
                            let _ = tx.send(hash.clone()).await;
                        }
                    }
                }
                Command::Deliver(hash, bytes) => {
                    match waiters.remove(&hash) {
                        Some(waiting) => {
                            debug!(hash = %hash, waiters = waiting.len(), "blob received");
                            for reply in waiting {
                                let _ = reply.send(bytes.clone());
                            }
                        }
                        None => {
                            // Unsolicited delivery: nobody is waiting, drop it. A
                            // caller that wants to cache these separately can feed
                            // them into the object store directly instead.
                            warn!(hash = %hash, "blob delivered with no outstanding waiter");
                        }
                    }
                }
            }
        }
    }
}

impl BlobExchangeHandle {
    /// Register this connection's outbox as a servicer: the returned
    /// receiver yields the hash of every blob this node needs but doesn't
    /// yet have, for the caller to turn into an outbound `HashRequest`.
    pub async fn register_servicer(&self) -> mpsc::Receiver<Hash> {
        let (tx, rx) = mpsc::channel(256);
        let _ = self.commands.send(Command::RegisterServicer(tx)).await;
        rx
    }

    /// Deliver a blob that arrived from a peer (solicited or not).
    pub async fn deliver(&self, hash: Hash, bytes: Bytes) {
        let _ = self.commands.send(Command::Deliver(hash, bytes)).await;
    }

    /// Fetch a blob's raw bytes, broadcasting a request to every registered
    /// servicer if no fetch for this hash is already outstanding, and
    /// waiting up to `timeout` (or the arbiter's default) for a delivery.
    pub async fn get_blob(&self, hash: &Hash) -> Result<Bytes, ExchangeError> {
        self.get_blob_with_timeout(hash, self.default_timeout).await
    }

    pub async fn get_blob_with_timeout(
        &self,
        hash: &Hash,
        timeout: Duration,
    ) -> Result<Bytes, ExchangeError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Request(hash.clone(), tx))
            .await
            .map_err(|_| ExchangeError::ArbiterGone)?;
        tokio::time::timeout(timeout, rx)
            .await
            .map_err(|_| {
                warn!(hash = %hash, timeout_secs = timeout.as_secs(), "gave up waiting for blob");
                ExchangeError::Timeout(hash.clone())
            })?
            .map_err(|_| ExchangeError::ArbiterGone)
    }
}

/// Bridges the exchange arbiter to `gitnext-branch`'s ancestry walk: a
/// commit missing from the local store is fetched over the wire, unmarshalled,
/// and written back so later lookups hit the store directly.
pub struct ExchangeCommitFetcher {
    exchange: BlobExchangeHandle,
    store: Arc<dyn ObjectStore>,
    serializer: Arc<dyn Serializer>,
}

impl ExchangeCommitFetcher {
    pub fn new(
        exchange: BlobExchangeHandle,
        store: Arc<dyn ObjectStore>,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        Self {
            exchange,
            store,
            serializer,
        }
    }
}

#[async_trait]
impl CommitFetcher for ExchangeCommitFetcher {
    async fn fetch_commit(&self, hash: &Hash) -> Result<CommitBlob, BranchError> {
        let bytes = self
            .exchange
            .get_blob(hash)
            .await
            .map_err(|_| BranchError::FetchFailed(hash.clone()))?;
        let blob = self
            .serializer
            .unmarshal(&bytes)
            .map_err(|_| BranchError::FetchFailed(hash.clone()))?;
        let commit = blob
            .as_commit()
            .cloned()
            .ok_or_else(|| BranchError::NotACommit(hash.clone()))?;
        let _ = self.store.put(&blob).await;
        Ok(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivery_satisfies_the_waiting_fetch() {
        let arbiter = BlobExchangeArbiter::spawn(Duration::from_millis(200));
        let hash = Hash::from_bytes(vec![1, 2, 3]);

        let fetcher = arbiter.clone();
        let h = hash.clone();
        let fetch = tokio::spawn(async move { fetcher.get_blob(&h).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        arbiter.deliver(hash, Bytes::from_static(b"payload")).await;

        let bytes = fetch.await.unwrap().unwrap();
        assert_eq!(bytes, Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn duplicate_fetches_for_one_hash_both_resolve() {
        let arbiter = BlobExchangeArbiter::spawn(Duration::from_millis(200));
        let hash = Hash::from_bytes(vec![9, 9, 9]);

        let a = arbiter.clone();
        let b = arbiter.clone();
        let ha = hash.clone();
        let hb = hash.clone();
        let fetch_a = tokio::spawn(async move { a.get_blob(&ha).await });
        let fetch_b = tokio::spawn(async move { b.get_blob(&hb).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        arbiter.deliver(hash, Bytes::from_static(b"shared")).await;

        assert_eq!(fetch_a.await.unwrap().unwrap(), Bytes::from_static(b"shared"));
        assert_eq!(fetch_b.await.unwrap().unwrap(), Bytes::from_static(b"shared"));
    }

    #[tokio::test]
    async fn unsolicited_delivery_is_tolerated() {
        let arbiter = BlobExchangeArbiter::spawn(Duration::from_millis(50));
        arbiter
            .deliver(Hash::from_bytes(vec![7]), Bytes::from_static(b"nobody asked"))
            .await;
        // No panic, no hang: the arbiter is still usable afterwards.
        let hash = Hash::from_bytes(vec![8]);
        let result = arbiter.get_blob(&hash).await;
        assert!(matches!(result, Err(ExchangeError::Timeout(_))));
    }
}
