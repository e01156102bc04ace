//! Shared fixtures: fake child apps on loopback and host-side capability
//! stubs.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use gangway::gateway::MainViewImpl;
use gangway::registry::SessionRegistry;
use gangway_types::{
    BoxFuture, BridgeConfig, BridgeError, ByteStream, MainView, PermissionDef, Session,
    SessionContext, SessionParams, SessionRequest, UserInfo, ViewInfo, WebSession,
    WebSessionParams, WebSocketStream,
};

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one complete HTTP request: the header block plus a `Content-Length`
/// or chunked body when one is declared.
pub async fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read(&mut tmp).await {
            Ok(0) | Err(_) => return buf,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    if let Some(rest) = head.split("content-length:").nth(1) {
        let length: usize = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            match stream.read(&mut tmp).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
            }
        }
    } else if head.contains("transfer-encoding: chunked") {
        while find(&buf[header_end..], b"0\r\n\r\n").is_none() {
            match stream.read(&mut tmp).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
            }
        }
    }
    buf
}

/// A fake app that answers every request with the same canned response and
/// hands the raw requests back to the test.
pub async fn spawn_canned_app(response: Vec<u8>) -> (u16, UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            let tx = tx.clone();
            let response = response.clone();
            tokio::spawn(async move {
                let request = read_request(&mut stream).await;
                let _ = tx.send(request);
                let _ = stream.write_all(&response).await;
            });
        }
    });
    (port, rx)
}

/// A fake app that answers as soon as it has the request *headers*, then
/// keeps draining the connection — the shape of an app that replies while
/// an upload is still in flight.
pub async fn spawn_early_response_app(response: Vec<u8>) -> (u16, UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            let tx = tx.clone();
            let response = response.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut tmp = [0u8; 4096];
                while find(&buf, b"\r\n\r\n").is_none() {
                    match stream.read(&mut tmp).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&tmp[..n]),
                    }
                }
                let _ = stream.write_all(&response).await;
                loop {
                    match stream.read(&mut tmp).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&tmp[..n]),
                    }
                }
                let _ = tx.send(buf);
            });
        }
    });
    (port, rx)
}

/// A fake app that accepts WebSocket upgrades and echoes raw bytes.
pub async fn spawn_ws_echo_app() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut tmp = [0u8; 4096];
                while find(&buf, b"\r\n\r\n").is_none() {
                    match stream.read(&mut tmp).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&tmp[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&buf).to_string();
                assert!(head.contains("Upgrade: websocket"));
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\
                          Connection: Upgrade\r\nSec-WebSocket-Protocol: chat\r\n\r\n",
                    )
                    .await;
                loop {
                    match stream.read(&mut tmp).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if stream.write_all(&tmp[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
    port
}

/// Host-side response sink collecting everything it is given.
#[derive(Default)]
pub struct TestSink {
    chunks: Mutex<Vec<Vec<u8>>>,
    done: AtomicU32,
}

impl TestSink {
    pub fn new() -> Arc<TestSink> {
        Arc::new(TestSink::default())
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.chunks.lock().unwrap().concat()
    }

    pub fn done_count(&self) -> u32 {
        self.done.load(Ordering::SeqCst)
    }

    pub async fn wait_done(&self) {
        while self.done_count() == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}

impl ByteStream for TestSink {
    fn write(&self, data: Vec<u8>) -> BoxFuture<'_, Result<(), BridgeError>> {
        self.chunks.lock().unwrap().push(data);
        Box::pin(async { Ok(()) })
    }
    fn done(&self) -> BoxFuture<'_, Result<(), BridgeError>> {
        self.done.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
    fn expect_size(&self, _size: u64) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Host-side WebSocket stream collecting received bytes.
#[derive(Default)]
pub struct TestWsStream {
    received: Mutex<Vec<u8>>,
}

impl TestWsStream {
    pub fn new() -> Arc<TestWsStream> {
        Arc::new(TestWsStream::default())
    }

    pub fn received(&self) -> Vec<u8> {
        self.received.lock().unwrap().clone()
    }

    pub async fn wait_for(&self, count: usize) {
        while self.received.lock().unwrap().len() < count {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}

impl WebSocketStream for TestWsStream {
    fn send_bytes(&self, message: Vec<u8>) -> BoxFuture<'_, Result<(), BridgeError>> {
        self.received.lock().unwrap().extend_from_slice(&message);
        Box::pin(async { Ok(()) })
    }
}

/// Host context stub that echoes the method it was called with.
pub struct TestContext;

impl SessionContext for TestContext {
    fn call(
        &self,
        method: String,
        _params: Value,
    ) -> BoxFuture<'_, Result<Value, BridgeError>> {
        Box::pin(async move { Ok(json!({ "context": method })) })
    }
}

pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        view_info: ViewInfo {
            permissions: vec![
                PermissionDef { name: "read".into(), ..PermissionDef::default() },
                PermissionDef { name: "write".into(), ..PermissionDef::default() },
            ],
        },
        api_path: "/api/".into(),
    }
}

pub fn test_user() -> UserInfo {
    UserInfo {
        display_name: "Alice Dev".into(),
        preferred_handle: "alice".into(),
        picture_url: String::new(),
        pronouns: Default::default(),
        identity_id: (0u8..32).collect(),
        permissions: vec![true, false],
    }
}

pub fn web_request() -> SessionRequest {
    SessionRequest {
        session_type: "web".into(),
        user_info: test_user(),
        context: Arc::new(TestContext),
        tab_id: vec![0xab, 0x12],
        params: SessionParams::Web(WebSessionParams {
            base_path: "https://grain.example".into(),
            user_agent: "TestBrowser/1.0".into(),
            acceptable_languages: vec!["en-US".into(), "en".into()],
        }),
    }
}

pub fn main_view(port: u16) -> (Arc<MainViewImpl>, Arc<SessionRegistry>) {
    let registry = SessionRegistry::new();
    let view = MainViewImpl::new(port, test_config(), registry.clone());
    (view, registry)
}

/// Open a web session against the given app port.
pub async fn web_session(port: u16) -> (Arc<dyn WebSession>, Arc<SessionRegistry>) {
    let (view, registry) = main_view(port);
    match view.new_session(web_request()).await.unwrap() {
        Session::Web(session) => (session, registry),
        Session::Email(_) => panic!("expected a web session"),
    }
}
