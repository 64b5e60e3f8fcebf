//! Wires every actor into one running node: object store, serializer,
//! tree watcher, branch arbiter + commit hierarchy, blob exchange, commit
//! pipeline, and the peer connections (inbound listener plus configured
//! outbound remotes). Mirrors the original `main()`'s role, minus config
//! parsing, which lives in the `gitnext-cli` binary.

mod peer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gitnext_branch::{BranchArbiter, CommitHierarchy};
use gitnext_commit::{CommitPipeline, Identity};
use gitnext_exchange::{BlobExchangeArbiter, ExchangeCommitFetcher, FetchingStore};
use gitnext_serializer::Serializer;
use gitnext_store::{DiskStore, ObjectStore};
use gitnext_watch::TreeMonitor;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

pub use peer::PeerContext;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Watch(#[from] gitnext_watch::WatchError),
    #[error(transparent)]
    Serializer(#[from] gitnext_serializer::SerializerError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct NodeConfig {
    pub watch_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub branch_name: String,
    pub serializer: String,
    pub listen_port: Option<u16>,
    pub remotes: Vec<String>,
    pub apikey: Vec<u8>,
    pub identity: Identity,
    pub debounce: Duration,
    pub blob_timeout: Duration,
}

pub struct Node {
    config: NodeConfig,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    /// Run until ctrl-c, wiring every actor together.
    pub async fn run(self) -> Result<(), NodeError> {
        let config = self.config;
        let serializer: Arc<dyn Serializer> = Arc::from(gitnext_serializer::by_name(&config.serializer)?);
        let apikey = Arc::new(config.apikey);

        let local_store: Arc<dyn ObjectStore> =
            Arc::new(DiskStore::new(config.cache_dir.clone(), serializer.clone()));

        let exchange = BlobExchangeArbiter::spawn(config.blob_timeout);
        let full_store: Arc<dyn ObjectStore> = Arc::new(FetchingStore::new(
            local_store.clone(),
            exchange.clone(),
            serializer.clone(),
        ));

        let commit_fetcher = Arc::new(ExchangeCommitFetcher::new(
            exchange.clone(),
            full_store.clone(),
            serializer.clone(),
        ));
        let hierarchy = CommitHierarchy::new(full_store.clone(), commit_fetcher);
        let branch = BranchArbiter::spawn(hierarchy);

        let ctx = Arc::new(PeerContext {
            branch_name: config.branch_name.clone(),
            branch: branch.clone(),
            exchange: exchange.clone(),
            store: full_store.clone(),
            serializer: serializer.clone(),
            apikey: apikey.clone(),
        });

        if let Some(port) = config.listen_port {
            let listener = TcpListener::bind(("0.0.0.0", port)).await?;
            let ctx = ctx.clone();
            let apikey = apikey.clone();
            tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, addr)) => {
                            info!(%addr, "accepted connection");
                            tokio::spawn(peer::handle_connection(stream, apikey.clone(), ctx.clone()));
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            break;
                        }
                    }
                }
            });
        }

        for remote in &config.remotes {
            let remote = remote.clone();
            let ctx = ctx.clone();
            let apikey = apikey.clone();
            tokio::spawn(async move {
                match gitnext_protocol::dial_with_retry(&remote).await {
                    Ok(stream) => peer::handle_connection(stream, apikey, ctx).await,
                    Err(e) => error!(remote = %remote, error = %e, "giving up dialing remote"),
                }
            });
        }

        let tree_hashes = TreeMonitor::new(config.watch_dir.clone(), full_store.clone(), config.debounce)
            .start()
            .await?;
        let remote_updates = branch.subscribe().await;
        let pipeline = CommitPipeline::new(
            config.watch_dir.clone(),
            config.branch_name.clone(),
            full_store.clone(),
            branch.clone(),
            config.identity.clone(),
        );
        tokio::spawn(pipeline.run(tree_hashes, remote_updates));

        info!(watch_dir = %config.watch_dir.display(), "node running");
        tokio::signal::ctrl_c().await?;
        info!("shutting down");
        Ok(())
    }
}
