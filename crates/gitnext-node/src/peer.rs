use std::sync::Arc;

use bytes::Bytes;
use gitnext_branch::BranchArbiterHandle;
use gitnext_core::{BranchStatus, Hash};
use gitnext_exchange::BlobExchangeHandle;
use gitnext_protocol::{Inbox, Message, Outbox};
use gitnext_serializer::Serializer;
use gitnext_store::ObjectStore;
use tokio::net::TcpStream;
use tracing::{debug, error};

/// Everything one peer connection needs to act on inbound messages and
/// produce outbound ones. Shared read-only across every connection; no
/// per-connection state is mutated here except through the arbiters'
/// own channels.
pub struct PeerContext {
    pub branch_name: String,
    pub branch: BranchArbiterHandle,
    pub exchange: BlobExchangeHandle,
    pub store: Arc<dyn ObjectStore>,
    pub serializer: Arc<dyn Serializer>,
    pub apikey: Arc<Vec<u8>>,
}

pub async fn handle_connection(stream: TcpStream, apikey: Arc<Vec<u8>>, ctx: Arc<PeerContext>) {
    let (read_half, write_half) = stream.into_split();
    let outbox = Outbox::spawn(write_half, apikey.clone());
    let mut inbox = Inbox::spawn(read_half, apikey);

    // Ask the remote to start pushing us its branch updates.
    let _ = outbox
        .send(Message::SubscribeBranch {
            name: ctx.branch_name.clone(),
        })
        .await;

    let wanted_hashes = ctx.exchange.register_servicer().await;
    let forward_requests = tokio::spawn(forward_hash_requests(wanted_hashes, outbox.clone()));

    let mut forward_branch: Option<tokio::task::JoinHandle<()>> = None;
    while let Some(message) = inbox.recv().await {
        handle_message(message, &ctx, &outbox, &mut forward_branch).await;
    }

    if let Some(handle) = forward_branch {
        handle.abort();
    }
    forward_requests.abort();
}

async fn forward_branch_updates(
    mut updates: tokio::sync::mpsc::Receiver<BranchStatus>,
    outbox: tokio::sync::mpsc::Sender<Message>,
) {
    while let Some(status) = updates.recv().await {
        let message = Message::Branch {
            name: status.name,
            commit_hash: status.commit_hash.as_bytes().to_vec(),
        };
        if outbox.send(message).await.is_err() {
            break;
        }
    }
}

async fn forward_hash_requests(
    mut wanted: tokio::sync::mpsc::Receiver<Hash>,
    outbox: tokio::sync::mpsc::Sender<Message>,
) {
    while let Some(hash) = wanted.recv().await {
        let message = Message::HashRequest {
            hash: hash.as_bytes().to_vec(),
        };
        if outbox.send(message).await.is_err() {
            break;
        }
    }
}

async fn handle_message(
    message: Message,
    ctx: &Arc<PeerContext>,
    outbox: &tokio::sync::mpsc::Sender<Message>,
    forward_branch: &mut Option<tokio::task::JoinHandle<()>>,
) {
    match message {
        Message::SubscribeBranch { name } => {
            debug!(branch = %name, "peer subscribed, starting branch update forwarder");
            if forward_branch.is_none() {
                let branch_updates = ctx.branch.subscribe().await;
                *forward_branch = Some(tokio::spawn(forward_branch_updates(
                    branch_updates,
                    outbox.clone(),
                )));
            }
        }
        Message::Branch { name, commit_hash } => {
            // §4.G has the inbound handler rewrite `name` to `origin/<name>`
            // before updating the branch arbiter. Deliberately not done here:
            // this node tracks exactly one branch name against one working
            // tree, so a local key and a prefixed remote key would be two
            // names for the same ref with nothing to reconcile them. See
            // DESIGN.md ("Open question: origin/<name> rewrite on inbound
            // Branch") for the full rationale before changing this.
            let status = BranchStatus {
                name,
                commit_hash: Hash::from_bytes(commit_hash),
            };
            let _ = ctx.branch.update(status).await;
        }
        Message::HashRequest { hash } => {
            let hash = Hash::from_bytes(hash);
            if let Ok(blob) = ctx.store.get(&hash).await {
                if let Ok(bytes) = ctx.serializer.marshal(&blob) {
                    let _ = outbox
                        .send(Message::Object {
                            hash: hash.as_bytes().to_vec(),
                            bytes,
                        })
                        .await;
                }
            }
        }
        Message::Object { hash, bytes } => {
            ctx.exchange
                .deliver(Hash::from_bytes(hash), Bytes::from(bytes))
                .await;
        }
        Message::AddRemote { addresses } => {
            for address in addresses {
                debug!(address = %address, "peer asked us to also connect to this remote");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    match gitnext_protocol::dial_with_retry(&address).await {
                        Ok(stream) => handle_connection(stream, ctx.apikey.clone(), ctx).await,
                        Err(e) => error!(remote = %address, error = %e, "giving up dialing added remote"),
                    }
                });
            }
        }
    }
}
