//! Peer wire protocol: uvarint-length-prefixed preamble framing, a
//! SHA-256-over-salted-apikey signature, and per-connection inbox/outbox
//! actors. Grounded on the original `SendMessage`/`network.go` framing and
//! `ArbitBlobRequests`/`ArbitBranchStatus`'s subscriber-channel style.

mod connection;
mod framing;
mod message;
mod signing;
mod varint;

use thiserror::Error;

pub use connection::{dial_with_retry, Inbox, Outbox};
pub use message::Message;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("message signature did not match the shared apikey")]
    BadSignature,
    #[error("failed to connect to {0}: {1}")]
    DialFailed(String, String),
}
