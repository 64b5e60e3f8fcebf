use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::{Envelope, Message, Preamble};
use crate::signing::{sign, verify};
use crate::varint::{read_uvarint, write_uvarint};
use crate::ProtocolError;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// `uvarint(len(preamble)) ++ preamble ++ message`, per the original
/// `SendMessage`: the preamble carries the message's length and signature,
/// and is itself length-prefixed so the reader knows how many bytes of
/// preamble to pull before it can even see the message length. The message
/// bytes are actually an `Envelope`, so the timestamp is set before signing
/// and travels inside the signed payload.
pub async fn write_message<W: AsyncWrite + Unpin>(
    w: &mut W,
    apikey: &[u8],
    message: &Message,
) -> Result<(), ProtocolError> {
    let envelope = Envelope {
        timestamp: now_unix(),
        message: message.clone(),
    };
    let message_bytes = bincode::serialize(&envelope)?;
    let preamble = Preamble {
        length: message_bytes.len() as u64,
        signature: sign(apikey, &message_bytes),
    };
    let preamble_bytes = bincode::serialize(&preamble)?;

    write_uvarint(w, preamble_bytes.len() as u64).await?;
    w.write_all(&preamble_bytes).await?;
    w.write_all(&message_bytes).await?;
    w.flush().await?;
    Ok(())
}

pub async fn read_message<R: AsyncRead + Unpin>(
    r: &mut R,
    apikey: &[u8],
) -> Result<Message, ProtocolError> {
    let preamble_len = read_uvarint(r).await?;
    let mut preamble_bytes = vec![0u8; preamble_len as usize];
    r.read_exact(&mut preamble_bytes).await?;
    let preamble: Preamble = bincode::deserialize(&preamble_bytes)?;

    let mut message_bytes = vec![0u8; preamble.length as usize];
    r.read_exact(&mut message_bytes).await?;

    if !verify(apikey, &message_bytes, &preamble.signature) {
        return Err(ProtocolError::BadSignature);
    }

    let envelope: Envelope = bincode::deserialize(&message_bytes)?;
    Ok(envelope.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_then_reads_the_same_message() {
        let apikey = b"secret-key";
        let message = Message::SubscribeBranch {
            name: "main".to_string(),
        };
        let mut buf = Vec::new();
        write_message(&mut buf, apikey, &message).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_message(&mut cursor, apikey).await.unwrap();
        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn wrong_apikey_is_rejected() {
        let message = Message::HashRequest { hash: vec![1, 2, 3] };
        let mut buf = Vec::new();
        write_message(&mut buf, b"key-a", &message).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let result = read_message(&mut cursor, b"key-b").await;
        assert!(matches!(result, Err(ProtocolError::BadSignature)));
    }
}
