use serde::{Deserialize, Serialize};

/// Wire-level message. Hashes travel as raw bytes rather than
/// `gitnext_core::Hash`, so this crate (and its serde dependency) stays
/// decoupled from the core hash type; callers convert at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Message {
    SubscribeBranch { name: String },
    Branch { name: String, commit_hash: Vec<u8> },
    HashRequest { hash: Vec<u8> },
    Object { hash: Vec<u8>, bytes: Vec<u8> },
    AddRemote { addresses: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Preamble {
    pub length: u64,
    pub signature: Vec<u8>,
}

/// Every frame carries a send-time timestamp, set before signing (§4.G);
/// this implementation doesn't act on it (no replay window, no clock-skew
/// rejection), but it travels inside the signed payload so a future
/// transport can add one without a wire format change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct Envelope {
    pub timestamp: i64,
    pub message: Message,
}
