use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::framing::{read_message, write_message};
use crate::message::Message;
use crate::ProtocolError;

const BACKOFF: Duration = Duration::from_millis(10);
const MAX_ELAPSED: Duration = Duration::from_secs(1);

/// Dial `addr`, retrying on a flat 10ms backoff for up to one second total;
/// fatal past that (§4.G.3).
pub async fn dial_with_retry(addr: &str) -> Result<TcpStream, ProtocolError> {
    let start = tokio::time::Instant::now();
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                if start.elapsed() >= MAX_ELAPSED {
                    return Err(ProtocolError::DialFailed(addr.to_string(), e.to_string()));
                }
                warn!(addr, error = %e, "retrying connection");
                tokio::time::sleep(BACKOFF).await;
            }
        }
    }
}

/// Drains a private inbox of outbound messages onto a writer, one actor
/// task per connection, owning the writer exclusively.
pub struct Outbox<W> {
    writer: W,
    apikey: Arc<Vec<u8>>,
    inbox: mpsc::Receiver<Message>,
}

impl<W: AsyncWrite + Unpin + Send + 'static> Outbox<W> {
    pub fn spawn(writer: W, apikey: Arc<Vec<u8>>) -> mpsc::Sender<Message> {
        let (tx, rx) = mpsc::channel(256);
        let outbox = Outbox {
            writer,
            apikey,
            inbox: rx,
        };
        tokio::spawn(outbox.run());
        tx
    }

    async fn run(mut self) {
        while let Some(message) = self.inbox.recv().await {
            if let Err(e) = write_message(&mut self.writer, &self.apikey, &message).await {
                warn!(error = %e, "failed to write message, closing connection");
                break;
            }
        }
    }
}

/// Reads framed messages off a reader and forwards them to `dispatch`, one
/// actor task per connection.
pub struct Inbox<R> {
    reader: R,
    apikey: Arc<Vec<u8>>,
}

impl<R: AsyncRead + Unpin + Send + 'static> Inbox<R> {
    pub fn spawn(reader: R, apikey: Arc<Vec<u8>>) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(256);
        let inbox = Inbox { reader, apikey };
        tokio::spawn(inbox.run(tx));
        rx
    }

    async fn run(mut self, dispatch: mpsc::Sender<Message>) {
        loop {
            match read_message(&mut self.reader, &self.apikey).await {
                Ok(message) => {
                    if dispatch.send(message).await.is_err() {
                        break;
                    }
                }
                Err(ProtocolError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    info!("peer closed connection");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "closing connection after framing error");
                    break;
                }
            }
        }
    }
}
