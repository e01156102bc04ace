//! Upstream-streaming request handles.
//!
//! `postStreaming`/`putStreaming` return one of these instead of awaiting
//! the upload. The header block is held back until the first `write`,
//! `done` or `expectSize`, because that is the moment the transfer framing
//! is decided: a declared size means `Content-Length`, anything else means
//! chunked.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use gangway_http::HttpResponseParser;
use gangway_types::{
    BoxFuture, BridgeError, ByteStream, RequestStream, Response,
};

use crate::session::IgnoreSink;

struct StreamState {
    /// The pending header block ending in `\r\n\r\n`, until first flush.
    pending_head: Option<String>,
    /// Chunked unless `expectSize` arrives before the headers are flushed.
    chunked: bool,
    done_called: bool,
    get_response_called: bool,
    bytes_received: u64,
    expected_size: Option<u64>,
}

/// A per-call streaming request capability.
pub struct RequestStreamImpl {
    state: Mutex<StreamState>,
    /// Serializes writes; the socket accepts one outstanding write at a time.
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    reader: Mutex<Option<OwnedReadHalf>>,
    response_sink: Option<Arc<dyn ByteStream>>,
}

impl RequestStreamImpl {
    /// Take ownership of a fresh connection with the request head pending.
    ///
    /// `head` must end in `\r\n\r\n`; the framing header is spliced in
    /// before the terminator when the head is flushed.
    pub fn new(
        head: String,
        stream: TcpStream,
        response_sink: Option<Arc<dyn ByteStream>>,
    ) -> Arc<RequestStreamImpl> {
        debug_assert!(head.ends_with("\r\n\r\n"));
        let (read_half, write_half) = stream.into_split();
        Arc::new(RequestStreamImpl {
            state: Mutex::new(StreamState {
                pending_head: Some(head),
                chunked: true,
                done_called: false,
                get_response_called: false,
                bytes_received: 0,
                expected_size: None,
            }),
            writer: tokio::sync::Mutex::new(write_half),
            reader: Mutex::new(Some(read_half)),
            response_sink,
        })
    }

    /// Splice the framing header into a pending head block.
    ///
    /// A known content length fixes identity framing; `None` leaves the
    /// stream chunked.
    fn flush_head(state: &mut StreamState, content_length: Option<u64>) -> Option<String> {
        let head = state.pending_head.take()?;
        let without_terminator = &head[..head.len() - 2];
        Some(match content_length {
            Some(length) => {
                state.chunked = false;
                format!("{without_terminator}Content-Length: {length}\r\n\r\n")
            }
            None => format!("{without_terminator}Transfer-Encoding: chunked\r\n\r\n"),
        })
    }
}

impl ByteStream for RequestStreamImpl {
    fn write(&self, data: Vec<u8>) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async move {
            let (head, chunked) = {
                let mut state = self.state.lock();
                if state.done_called {
                    return Err(BridgeError::Contract("write() called after done()"));
                }
                state.bytes_received += data.len() as u64;
                if let Some(expected) = state.expected_size {
                    if state.bytes_received > expected {
                        return Err(BridgeError::Contract("received more bytes than expected"));
                    }
                }
                (Self::flush_head(&mut state, None), state.chunked)
            };

            let mut out = Vec::with_capacity(data.len() + 32);
            if let Some(head) = head {
                out.extend_from_slice(head.as_bytes());
            }
            if chunked {
                out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
                out.extend_from_slice(&data);
                out.extend_from_slice(b"\r\n");
            } else {
                out.extend_from_slice(&data);
            }

            let mut writer = self.writer.lock().await;
            writer.write_all(&out).await.map_err(BridgeError::Connection)
        })
    }

    fn done(&self) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async move {
            let (head, chunked) = {
                let mut state = self.state.lock();
                if let Some(expected) = state.expected_size {
                    if state.bytes_received != expected {
                        return Err(BridgeError::Contract(
                            "done() called before all bytes expected via expectSize() were written",
                        ));
                    }
                }
                if state.done_called {
                    return Err(BridgeError::Contract("done() called twice"));
                }
                state.done_called = true;
                // An unflushed head means an empty body, so zero is exact.
                (Self::flush_head(&mut state, Some(0)), state.chunked)
            };

            let mut out = Vec::new();
            if let Some(head) = head {
                out.extend_from_slice(head.as_bytes());
            }
            if chunked {
                out.extend_from_slice(b"0\r\n\r\n");
            }
            if out.is_empty() {
                return Ok(());
            }

            let mut writer = self.writer.lock().await;
            writer.write_all(&out).await.map_err(BridgeError::Connection)
        })
    }

    fn expect_size(&self, size: u64) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async move {
            let head = {
                let mut state = self.state.lock();
                state.expected_size = Some(state.bytes_received + size);
                Self::flush_head(&mut state, Some(size))
            };

            if let Some(head) = head {
                let mut writer = self.writer.lock().await;
                writer
                    .write_all(head.as_bytes())
                    .await
                    .map_err(BridgeError::Connection)?;
            }
            Ok(())
        })
    }
}

impl RequestStream for RequestStreamImpl {
    /// Parse the app's response; may be called before `done` so the app can
    /// answer while the upload is still in flight.
    fn get_response(&self) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let mut reader = {
                let mut state = self.state.lock();
                if state.get_response_called {
                    return Err(BridgeError::Contract("getResponse() called more than once"));
                }
                state.get_response_called = true;
                drop(state);
                self.reader
                    .lock()
                    .take()
                    .ok_or(BridgeError::Contract("request stream lost its connection"))?
            };

            let mut parser = HttpResponseParser::new();
            let remainder = parser.read_head(&mut reader).await?;
            debug_assert!(remainder.is_empty() || parser.is_upgrade());

            let sink = self
                .response_sink
                .clone()
                .unwrap_or_else(|| Arc::new(IgnoreSink));
            let handle = parser.pump_stream(reader, sink);
            parser.build_content(handle)
        })
    }
}
