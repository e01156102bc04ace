//! WebSocket byte pumps.
//!
//! After a 101 upgrade the TCP connection stops carrying HTTP framing and
//! the adapter just moves bytes: a downstream task reads from the app and
//! forwards chunks into the host's stream capability, while the
//! adapter-exported stream serializes host writes onto the socket.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use gangway_types::{BoxFuture, BridgeError, WebSocketStream};

/// Read granularity of the downstream pump.
const READ_CHUNK: usize = 4096;

/// The server-side half of an open WebSocket.
///
/// Owns the upgraded connection: host-invoked `sendBytes` goes out through
/// the write half, and an internal task pumps the read half back into the
/// host's client stream. Dropping the pump aborts the task and closes the
/// connection.
pub struct WebSocketPump {
    writer: Mutex<OwnedWriteHalf>,
    downstream: JoinHandle<()>,
}

impl WebSocketPump {
    /// Install the pumps on an upgraded connection.
    ///
    /// `early` holds any bytes that arrived past the 101 header terminator;
    /// they belong to the WebSocket and are forwarded first.
    pub fn start(
        stream: TcpStream,
        client_stream: Arc<dyn WebSocketStream>,
        early: Vec<u8>,
    ) -> Arc<WebSocketPump> {
        let (read_half, write_half) = stream.into_split();
        let downstream = tokio::spawn(downstream_pump(read_half, client_stream, early));
        Arc::new(WebSocketPump {
            writer: Mutex::new(write_half),
            downstream,
        })
    }
}

impl WebSocketStream for WebSocketPump {
    /// Bytes from the host, written to the app.
    ///
    /// The async mutex serializes writes; each call resolves when its own
    /// write finishes, which is the host's backpressure signal.
    fn send_bytes(&self, message: Vec<u8>) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async move {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(&message)
                .await
                .map_err(BridgeError::Connection)
        })
    }
}

impl Drop for WebSocketPump {
    fn drop(&mut self) {
        self.downstream.abort();
    }
}

/// App-to-host direction: read chunks, wrap them in `sendBytes` calls.
///
/// Send failures are logged and swallowed — WebSocket datagrams are one-way
/// and the application protocol on top must carry its own acks. EOF drops
/// the client stream capability, which is the close signal.
async fn downstream_pump(
    mut read_half: OwnedReadHalf,
    client_stream: Arc<dyn WebSocketStream>,
    early: Vec<u8>,
) {
    use tokio::io::AsyncReadExt;

    if !early.is_empty() {
        if let Err(error) = client_stream.send_bytes(early).await {
            warn!(%error, "websocket downstream send failed");
        }
    }

    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match read_half.read(&mut chunk).await {
            Ok(0) => {
                debug!("websocket closed by app");
                break;
            }
            Ok(n) => {
                if let Err(error) = client_stream.send_bytes(chunk[..n].to_vec()).await {
                    warn!(%error, "websocket downstream send failed");
                }
            }
            Err(error) => {
                warn!(%error, "websocket read from app failed");
                break;
            }
        }
    }
    // Dropping client_stream here releases the host capability.
}
