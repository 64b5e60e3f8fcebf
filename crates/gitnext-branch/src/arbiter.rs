use std::collections::HashMap;

use gitnext_core::{BranchStatus, Hash};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::{BranchError, CommitHierarchy};

enum Command {
    Subscribe(oneshot::Sender<mpsc::Receiver<BranchStatus>>),
    Update(BranchStatus, oneshot::Sender<Result<bool, BranchError>>),
}

/// One task owning all branch state; no locks shared across callers. Accepts
/// an update only if it is a fast-forward of (or equal to) the branch's
/// current commit — diverged histories are rejected outright, since this
/// system only ever does destructive fast-forward merges, never a three-way
/// merge.
pub struct BranchArbiter {
    commands: mpsc::Receiver<Command>,
    hierarchy: CommitHierarchy,
}

#[derive(Clone)]
pub struct BranchArbiterHandle {
    commands: mpsc::Sender<Command>,
}

impl BranchArbiter {
    pub fn spawn(hierarchy: CommitHierarchy) -> BranchArbiterHandle {
        let (tx, rx) = mpsc::channel(256);
        let arbiter = BranchArbiter {
            commands: rx,
            hierarchy,
        };
        tokio::spawn(arbiter.run());
        BranchArbiterHandle { commands: tx }
    }

    async fn run(mut self) {
        let mut statuses: HashMap<String, Hash> = HashMap::new();
        let mut subscribers: Vec<mpsc::Sender<BranchStatus>> = Vec::new();

        while let Some(cmd) = self.commands.recv().await {
            match cmd {
                Command::Subscribe(reply) => {
                    let (tx, rx) = mpsc::channel(64);
                    // Deliver whatever this node already knows immediately: a
                    // peer connecting after the fact must learn the current
                    // status, not just future fast-forwards (§4.E).
                    for (name, hash) in &statuses {
                        let _ = tx.try_send(BranchStatus {
                            name: name.clone(),
                            commit_hash: hash.clone(),
                        });
                    }
                    subscribers.push(tx);
                    let _ = reply.send(rx);
                }
                Command::Update(status, reply) => {
                    // Equal-to-current is a no-op, not an acceptance: fanning it
                    // out again would let a duplicate remote Branch message
                    // masquerade as a fresh fast-forward downstream (§4.E).
                    if let Some(current) = statuses.get(&status.name) {
                        if *current == status.commit_hash {
                            let _ = reply.send(Ok(false));
                            continue;
                        }
                    }

                    let accepted = match statuses.get(&status.name) {
                        None => true,
                        Some(current) => {
                            match self
                                .hierarchy
                                .descends_from(&status.commit_hash, current)
                                .await
                            {
                                Ok(ok) => ok,
                                Err(e) => {
                                    let _ = reply.send(Err(e));
                                    continue;
                                }
                            }
                        }
                    };

                    if accepted {
                        statuses.insert(status.name.clone(), status.commit_hash.clone());
                        info!(branch = %status.name, commit = %status.commit_hash, "branch fast-forwarded");
                        subscribers.retain(|tx| !tx.is_closed());
                        for tx in &subscribers {
                            let _ = tx.send(status.clone()).await;
                        }
                    }
                    let _ = reply.send(Ok(accepted));
                }
            }
        }
    }
}

impl BranchArbiterHandle {
    /// Subscribe to every future accepted branch update.
    pub async fn subscribe(&self) -> mpsc::Receiver<BranchStatus> {
        let (tx, rx) = oneshot::channel();
        let _ = self.commands.send(Command::Subscribe(tx)).await;
        rx.await.expect("branch arbiter task gone")
    }

    /// Propose a branch update; returns whether it was accepted as a
    /// fast-forward.
    pub async fn update(&self, status: BranchStatus) -> Result<bool, BranchError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Update(status, tx))
            .await
            .map_err(|_| BranchError::ArbiterGone)?;
        rx.await.map_err(|_| BranchError::ArbiterGone)?
    }
}
