use sha2::{Digest, Sha256};

/// `SHA256(apikey || message || apikey)` — not a real HMAC (no key/message
/// length separation, no dedicated construction), kept exactly as the
/// original implementation's scheme rather than swapped for a real MAC,
/// since this is an authorization token check between trusted peers, not a
/// security boundary against an active attacker.
pub fn sign(apikey: &[u8], message: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(apikey);
    hasher.update(message);
    hasher.update(apikey);
    hasher.finalize().to_vec()
}

pub fn verify(apikey: &[u8], message: &[u8], signature: &[u8]) -> bool {
    sign(apikey, message) == signature
}
