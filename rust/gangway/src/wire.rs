//! The minimal two-party capability wire.
//!
//! The platform's capability-RPC layer is an external collaborator; this
//! module is the seam where it plugs in, carrying just enough protocol for
//! the adapter's two sockets to function. Frames are newline-delimited JSON:
//!
//! ```text
//! {"kind":"call","id":7,"target":0,"method":"getViewInfo","params":{}}
//! {"kind":"return","id":7,"ok":{...}}
//! {"kind":"release","target":4}
//! ```
//!
//! Each connection has a capability table. Ids exported by the accepting
//! side are even, with 0 the bootstrap; the connecting peer's exports are
//! odd, with 1 its bootstrap. Capability references inside values are
//! `{"$cap": id}`, binary fields are base64 strings.
//!
//! Call futures receive their first poll in frame-arrival order and only
//! then continue on background tasks, so per-capability contract checks and
//! socket writes observe calls in the order the peer issued them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use gangway_types::{
    AcceptedType, BoxFuture, BridgeApi, BridgeError, ByteStream, CallContext, Content,
    ContentBody, EmailSession, ETagPrecondition, HeaderEntry, MainView, RequestStream, Response,
    ResponseVariant, SandstormApi, Session, SessionContext, SessionParams, SessionRequest,
    StreamHandle, WebSession, WebSocketStream,
};

/// The accepting side's bootstrap capability id.
pub const BOOTSTRAP_EXPORT: u64 = 0;
/// The connecting peer's bootstrap capability id.
pub const PEER_BOOTSTRAP: u64 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum Frame {
    Call {
        id: u64,
        target: u64,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Return {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ok: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    Release {
        target: u64,
    },
}

/// Something callable over the wire.
pub trait WireTarget: Send + Sync {
    fn call(
        self: Arc<Self>,
        conn: WireConn,
        method: String,
        params: Value,
    ) -> BoxFuture<'static, Result<Value, BridgeError>>;
}

struct ConnInner {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    exports: parking_lot::Mutex<HashMap<u64, Arc<dyn WireTarget>>>,
    next_export: AtomicU64,
    next_call: AtomicU64,
    pending: parking_lot::Mutex<HashMap<u64, oneshot::Sender<Result<Value, BridgeError>>>>,
}

/// One capability connection. Cheap to clone; the last clone going away
/// closes nothing by itself (the read task owns the socket's read half).
#[derive(Clone)]
pub struct WireConn {
    inner: Arc<ConnInner>,
}

/// Serve `bootstrap` on a byte stream, spawning the connection's read task.
pub fn serve<S>(stream: S, bootstrap: Arc<dyn WireTarget>) -> WireConn
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut exports: HashMap<u64, Arc<dyn WireTarget>> = HashMap::new();
    exports.insert(BOOTSTRAP_EXPORT, bootstrap);

    let conn = WireConn {
        inner: Arc::new(ConnInner {
            writer: tokio::sync::Mutex::new(Box::new(write_half)),
            exports: parking_lot::Mutex::new(exports),
            next_export: AtomicU64::new(2),
            next_call: AtomicU64::new(0),
            pending: parking_lot::Mutex::new(HashMap::new()),
        }),
    };
    tokio::spawn(read_loop(conn.clone(), read_half));
    conn
}

async fn read_loop<R>(conn: WireConn, read_half: R)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Frame>(&line) {
                    Ok(frame) => conn.handle_frame(frame).await,
                    Err(error) => warn!(%error, "undecodable wire frame"),
                }
            }
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "capability connection failed");
                break;
            }
        }
    }
    conn.fail_pending();
}

impl WireConn {
    /// Export a capability, returning its id.
    pub fn export(&self, target: Arc<dyn WireTarget>) -> u64 {
        let id = self.inner.next_export.fetch_add(2, Ordering::Relaxed);
        self.inner.exports.lock().insert(id, target);
        id
    }

    /// Call a peer capability and await its return value.
    pub async fn call(
        &self,
        target: u64,
        method: &str,
        params: Value,
    ) -> Result<Value, BridgeError> {
        let id = self.inner.next_call.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);

        let frame = Frame::Call { id, target, method: method.to_owned(), params };
        if let Err(error) = self.write_frame(&frame).await {
            self.inner.pending.lock().remove(&id);
            return Err(error);
        }
        rx.await
            .map_err(|_| BridgeError::wire("connection closed before reply"))?
    }

    /// Queue a release of a peer capability. Used from `Drop` impls, which
    /// cannot await. A missing runtime means the process is tearing down
    /// and the release is moot.
    pub fn release_later(&self, target: u64) {
        let conn = self.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = conn.write_frame(&Frame::Release { target }).await;
            });
        }
    }

    async fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::Call { id, target, method, params } => {
                let resolved = self.inner.exports.lock().get(&target).cloned();
                let conn = self.clone();
                let mut fut = Box::pin(async move {
                    let result = match resolved {
                        Some(obj) => obj.call(conn.clone(), method, params).await,
                        None => Err(BridgeError::wire(format!("no such capability {target}"))),
                    };
                    let reply = match result {
                        Ok(value) => Frame::Return { id, ok: Some(value), err: None },
                        Err(error) => {
                            Frame::Return { id, ok: None, err: Some(error.to_string()) }
                        }
                    };
                    if let Err(error) = conn.write_frame(&reply).await {
                        debug!(%error, "dropping reply on closed connection");
                    }
                });
                // First poll in arrival order; long calls continue in the
                // background so the read loop never deadlocks on them.
                if futures_util::future::poll_immediate(fut.as_mut())
                    .await
                    .is_none()
                {
                    tokio::spawn(fut);
                }
            }
            Frame::Return { id, ok, err } => {
                let sender = self.inner.pending.lock().remove(&id);
                if let Some(sender) = sender {
                    let outcome = match err {
                        Some(message) => Err(BridgeError::Wire(message)),
                        None => Ok(ok.unwrap_or(Value::Null)),
                    };
                    let _ = sender.send(outcome);
                }
            }
            Frame::Release { target } => {
                self.inner.exports.lock().remove(&target);
            }
        }
    }

    async fn write_frame(&self, frame: &Frame) -> Result<(), BridgeError> {
        let mut bytes =
            serde_json::to_vec(frame).map_err(|error| BridgeError::wire(error.to_string()))?;
        bytes.push(b'\n');
        let mut writer = self.inner.writer.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|error| BridgeError::wire(error.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|error| BridgeError::wire(error.to_string()))
    }

    fn fail_pending(&self) {
        for (_, sender) in self.inner.pending.lock().drain() {
            let _ = sender.send(Err(BridgeError::wire("connection closed")));
        }
    }
}

/// `{"$cap": id}`
pub fn cap_ref(id: u64) -> Value {
    json!({ "$cap": id })
}

fn cap_id(value: Option<&Value>) -> Option<u64> {
    value?.get("$cap")?.as_u64()
}

fn unknown_method(interface: &str, method: &str) -> BridgeError {
    BridgeError::wire(format!("unknown method {interface}.{method}"))
}

fn to_ok<T: Serialize>(value: &T) -> Result<Value, BridgeError> {
    serde_json::to_value(value).map_err(|error| BridgeError::wire(error.to_string()))
}

fn from_field<T: serde::de::DeserializeOwned + Default>(
    params: &Value,
    name: &str,
) -> Result<T, BridgeError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|error| BridgeError::wire(format!("bad {name}: {error}"))),
    }
}

fn str_field(params: &Value, name: &str) -> Result<String, BridgeError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| BridgeError::wire(format!("missing {name}")))
}

fn opt_str_field(params: &Value, name: &str) -> Option<String> {
    params.get(name).and_then(Value::as_str).map(str::to_owned)
}

fn bool_field(params: &Value, name: &str) -> bool {
    params.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn bytes_field(params: &Value, name: &str) -> Result<Vec<u8>, BridgeError> {
    match params.get(name).and_then(Value::as_str) {
        Some(encoded) => BASE64
            .decode(encoded)
            .map_err(|error| BridgeError::wire(format!("bad {name}: {error}"))),
        None => Ok(Vec::new()),
    }
}

fn decode_content(params: &Value) -> Result<Content, BridgeError> {
    let content = params.get("content").cloned().unwrap_or(Value::Null);
    Ok(Content {
        mime_type: opt_str_field(&content, "mimeType").unwrap_or_default(),
        content: bytes_field(&content, "content")?,
        encoding: opt_str_field(&content, "encoding"),
    })
}

fn decode_context(conn: &WireConn, params: &Value) -> Result<CallContext, BridgeError> {
    let context = params.get("context").cloned().unwrap_or(Value::Null);
    let cookies: Vec<(String, String)> = from_field(&context, "cookies")?;
    let accept: Vec<AcceptedType> = from_field(&context, "accept")?;
    let etag_precondition: ETagPrecondition = from_field(&context, "eTagPrecondition")?;
    let additional_headers: Vec<HeaderEntry> = from_field(&context, "additionalHeaders")?;
    let response_stream = cap_id(context.get("responseStream"))
        .map(|cap| RemoteByteStream::new(conn.clone(), cap) as Arc<dyn ByteStream>);

    Ok(CallContext {
        cookies,
        response_stream,
        accept,
        etag_precondition,
        additional_headers,
    })
}

fn encode_response(conn: &WireConn, response: Response) -> Result<Value, BridgeError> {
    let set_cookies = to_ok(&response.set_cookies)?;
    let variant = match response.variant {
        ResponseVariant::Content(content) => {
            let body = match content.body {
                ContentBody::Bytes(bytes) => json!({ "bytes": BASE64.encode(bytes) }),
                ContentBody::Stream(handle) => {
                    let cap = conn.export(Arc::new(HandleTarget::new(handle)));
                    json!({ "stream": cap_ref(cap) })
                }
            };
            json!({ "content": {
                "statusCode": to_ok(&content.status)?,
                "encoding": content.encoding,
                "language": content.language,
                "mimeType": content.mime_type,
                "eTag": content.etag.as_ref().map(to_ok).transpose()?,
                "disposition": content.disposition_download.map(|f| json!({ "download": f })),
                "body": body,
            }})
        }
        ResponseVariant::NoContent { should_reset_form } => {
            json!({ "noContent": { "shouldResetForm": should_reset_form } })
        }
        ResponseVariant::PreconditionFailed { matching_etag } => {
            json!({ "preconditionFailed": {
                "matchingETag": matching_etag.as_ref().map(to_ok).transpose()?,
            }})
        }
        ResponseVariant::Redirect { is_permanent, switch_to_get, location } => {
            json!({ "redirect": {
                "isPermanent": is_permanent,
                "switchToGet": switch_to_get,
                "location": location,
            }})
        }
        ResponseVariant::ClientError { status, description_html } => {
            json!({ "clientError": {
                "statusCode": to_ok(&status)?,
                "descriptionHtml": BASE64.encode(description_html),
            }})
        }
        ResponseVariant::ServerError { description_html } => {
            json!({ "serverError": {
                "descriptionHtml": BASE64.encode(description_html),
            }})
        }
    };
    Ok(json!({ "setCookies": set_cookies, "variant": variant }))
}

// ---------------------------------------------------------------------------
// Proxies: peer capabilities surfaced as the typed traits.

/// A host-side byte sink reached over the wire.
pub struct RemoteByteStream {
    conn: WireConn,
    cap: u64,
}

impl RemoteByteStream {
    pub fn new(conn: WireConn, cap: u64) -> Arc<RemoteByteStream> {
        Arc::new(RemoteByteStream { conn, cap })
    }
}

impl ByteStream for RemoteByteStream {
    fn write(&self, data: Vec<u8>) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async move {
            self.conn
                .call(self.cap, "write", json!({ "data": BASE64.encode(data) }))
                .await
                .map(drop)
        })
    }
    fn done(&self) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async move { self.conn.call(self.cap, "done", json!({})).await.map(drop) })
    }
    fn expect_size(&self, size: u64) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async move {
            self.conn
                .call(self.cap, "expectSize", json!({ "size": size }))
                .await
                .map(drop)
        })
    }
}

impl Drop for RemoteByteStream {
    fn drop(&mut self) {
        self.conn.release_later(self.cap);
    }
}

/// A host-side WebSocket stream reached over the wire.
pub struct RemoteWebSocketStream {
    conn: WireConn,
    cap: u64,
}

impl RemoteWebSocketStream {
    pub fn new(conn: WireConn, cap: u64) -> Arc<RemoteWebSocketStream> {
        Arc::new(RemoteWebSocketStream { conn, cap })
    }
}

impl WebSocketStream for RemoteWebSocketStream {
    fn send_bytes(&self, message: Vec<u8>) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async move {
            self.conn
                .call(self.cap, "sendBytes", json!({ "message": BASE64.encode(message) }))
                .await
                .map(drop)
        })
    }
}

impl Drop for RemoteWebSocketStream {
    fn drop(&mut self) {
        self.conn.release_later(self.cap);
    }
}

/// A host-side session context reached over the wire.
pub struct RemoteSessionContext {
    conn: WireConn,
    cap: u64,
}

impl RemoteSessionContext {
    pub fn new(conn: WireConn, cap: u64) -> Arc<RemoteSessionContext> {
        Arc::new(RemoteSessionContext { conn, cap })
    }
}

impl SessionContext for RemoteSessionContext {
    fn call(
        &self,
        method: String,
        params: Value,
    ) -> BoxFuture<'_, Result<Value, BridgeError>> {
        Box::pin(async move { self.conn.call(self.cap, &method, params).await })
    }
}

impl Drop for RemoteSessionContext {
    fn drop(&mut self) {
        self.conn.release_later(self.cap);
    }
}

/// The host's bootstrap API capability.
pub struct RemoteSandstormApi {
    conn: WireConn,
}

impl RemoteSandstormApi {
    pub fn new(conn: WireConn) -> Arc<RemoteSandstormApi> {
        Arc::new(RemoteSandstormApi { conn })
    }
}

impl SandstormApi for RemoteSandstormApi {
    fn call(
        &self,
        method: String,
        params: Value,
    ) -> BoxFuture<'_, Result<Value, BridgeError>> {
        Box::pin(async move { self.conn.call(PEER_BOOTSTRAP, &method, params).await })
    }
}

// ---------------------------------------------------------------------------
// Targets: adapter capabilities exposed to the peer.

/// Bootstrap target for the host socket.
pub struct MainViewTarget(pub Arc<dyn MainView>);

impl WireTarget for MainViewTarget {
    fn call(
        self: Arc<Self>,
        conn: WireConn,
        method: String,
        params: Value,
    ) -> BoxFuture<'static, Result<Value, BridgeError>> {
        Box::pin(async move {
            match method.as_str() {
                "getViewInfo" => to_ok(&self.0.get_view_info().await?),
                "newSession" => {
                    let request = decode_session_request(&conn, &params)?;
                    let session = self.0.new_session(request).await?;
                    let cap = match session {
                        Session::Web(session) => {
                            conn.export(Arc::new(WebSessionTarget(session)))
                        }
                        Session::Email(session) => {
                            conn.export(Arc::new(EmailSessionTarget(session)))
                        }
                    };
                    Ok(json!({ "session": cap_ref(cap) }))
                }
                _ => Err(unknown_method("MainView", &method)),
            }
        })
    }
}

fn decode_session_request(
    conn: &WireConn,
    params: &Value,
) -> Result<SessionRequest, BridgeError> {
    let context_cap = cap_id(params.get("context"))
        .ok_or_else(|| BridgeError::wire("newSession without a context capability"))?;
    let context = RemoteSessionContext::new(conn.clone(), context_cap);

    let session_params = match params.get("params") {
        Some(value) if value.get("web").is_some() => {
            SessionParams::Web(from_field(value, "web")?)
        }
        Some(value) if value.get("api").is_some() => {
            SessionParams::Api(from_field(value, "api")?)
        }
        _ => SessionParams::None,
    };

    Ok(SessionRequest {
        session_type: str_field(params, "sessionType")?,
        user_info: from_field(params, "userInfo")?,
        context,
        tab_id: bytes_field(params, "tabId")?,
        params: session_params,
    })
}

/// A web or API session exposed to the peer.
pub struct WebSessionTarget(pub Arc<dyn WebSession>);

impl WireTarget for WebSessionTarget {
    fn call(
        self: Arc<Self>,
        conn: WireConn,
        method: String,
        params: Value,
    ) -> BoxFuture<'static, Result<Value, BridgeError>> {
        Box::pin(async move {
            let session = &self.0;
            match method.as_str() {
                "get" => {
                    let path = str_field(&params, "path")?;
                    let context = decode_context(&conn, &params)?;
                    let ignore_body = bool_field(&params, "ignoreBody");
                    let response = session.get(path, context, ignore_body).await?;
                    encode_response(&conn, response)
                }
                "post" | "put" | "patch" | "mkcol" | "report" => {
                    let path = str_field(&params, "path")?;
                    let content = decode_content(&params)?;
                    let context = decode_context(&conn, &params)?;
                    let response = match method.as_str() {
                        "post" => session.post(path, content, context).await?,
                        "put" => session.put(path, content, context).await?,
                        "patch" => session.patch(path, content, context).await?,
                        "mkcol" => session.mkcol(path, content, context).await?,
                        _ => session.report(path, content, context).await?,
                    };
                    encode_response(&conn, response)
                }
                "delete" => {
                    let path = str_field(&params, "path")?;
                    let context = decode_context(&conn, &params)?;
                    encode_response(&conn, session.delete(path, context).await?)
                }
                "propfind" => {
                    let path = str_field(&params, "path")?;
                    let xml = str_field(&params, "xmlContent")?;
                    let depth = from_field(&params, "depth")?;
                    let context = decode_context(&conn, &params)?;
                    encode_response(&conn, session.propfind(path, xml, depth, context).await?)
                }
                "proppatch" => {
                    let path = str_field(&params, "path")?;
                    let xml = str_field(&params, "xmlContent")?;
                    let context = decode_context(&conn, &params)?;
                    encode_response(&conn, session.proppatch(path, xml, context).await?)
                }
                "copy" => {
                    let path = str_field(&params, "path")?;
                    let destination = str_field(&params, "destination")?;
                    let context = decode_context(&conn, &params)?;
                    let response = session
                        .copy(
                            path,
                            destination,
                            bool_field(&params, "noOverwrite"),
                            bool_field(&params, "shallow"),
                            context,
                        )
                        .await?;
                    encode_response(&conn, response)
                }
                "move" => {
                    let path = str_field(&params, "path")?;
                    let destination = str_field(&params, "destination")?;
                    let context = decode_context(&conn, &params)?;
                    let response = session
                        .move_(path, destination, bool_field(&params, "noOverwrite"), context)
                        .await?;
                    encode_response(&conn, response)
                }
                "lock" => {
                    let path = str_field(&params, "path")?;
                    let xml = str_field(&params, "xmlContent")?;
                    let context = decode_context(&conn, &params)?;
                    let response = session
                        .lock(path, xml, bool_field(&params, "shallow"), context)
                        .await?;
                    encode_response(&conn, response)
                }
                "unlock" => {
                    let path = str_field(&params, "path")?;
                    let lock_token = str_field(&params, "lockToken")?;
                    let context = decode_context(&conn, &params)?;
                    encode_response(&conn, session.unlock(path, lock_token, context).await?)
                }
                "acl" => {
                    let path = str_field(&params, "path")?;
                    let xml = str_field(&params, "xmlContent")?;
                    let context = decode_context(&conn, &params)?;
                    encode_response(&conn, session.acl(path, xml, context).await?)
                }
                "options" => {
                    let path = str_field(&params, "path")?;
                    let context = decode_context(&conn, &params)?;
                    to_ok(&session.options(path, context).await?)
                }
                "postStreaming" | "putStreaming" => {
                    let path = str_field(&params, "path")?;
                    let mime_type = opt_str_field(&params, "mimeType").unwrap_or_default();
                    let encoding = opt_str_field(&params, "encoding");
                    let context = decode_context(&conn, &params)?;
                    let stream = if method.as_str() == "postStreaming" {
                        session.post_streaming(path, mime_type, encoding, context).await?
                    } else {
                        session.put_streaming(path, mime_type, encoding, context).await?
                    };
                    let cap = conn.export(Arc::new(RequestStreamTarget(stream)));
                    Ok(json!({ "stream": cap_ref(cap) }))
                }
                "openWebSocket" => {
                    let path = str_field(&params, "path")?;
                    let context = decode_context(&conn, &params)?;
                    let protocols: Vec<String> = from_field(&params, "protocol")?;
                    let client_cap = cap_id(params.get("clientStream")).ok_or_else(|| {
                        BridgeError::wire("openWebSocket without a client stream")
                    })?;
                    let client = RemoteWebSocketStream::new(conn.clone(), client_cap);
                    let accept = session
                        .open_web_socket(path, context, protocols, client)
                        .await?;
                    let cap =
                        conn.export(Arc::new(WebSocketStreamTarget(accept.server_stream)));
                    Ok(json!({
                        "protocol": accept.protocol,
                        "serverStream": cap_ref(cap),
                    }))
                }
                _ => Err(unknown_method("WebSession", &method)),
            }
        })
    }
}

/// An upstream-streaming request exposed to the peer.
pub struct RequestStreamTarget(pub Arc<dyn RequestStream>);

impl WireTarget for RequestStreamTarget {
    fn call(
        self: Arc<Self>,
        conn: WireConn,
        method: String,
        params: Value,
    ) -> BoxFuture<'static, Result<Value, BridgeError>> {
        Box::pin(async move {
            match method.as_str() {
                "write" => {
                    let data = bytes_field(&params, "data")?;
                    self.0.write(data).await.map(|_| Value::Null)
                }
                "done" => self.0.done().await.map(|_| Value::Null),
                "expectSize" => {
                    let size = params
                        .get("size")
                        .and_then(Value::as_u64)
                        .ok_or_else(|| BridgeError::wire("missing size"))?;
                    self.0.expect_size(size).await.map(|_| Value::Null)
                }
                "getResponse" => {
                    let response = self.0.get_response().await?;
                    encode_response(&conn, response)
                }
                _ => Err(unknown_method("RequestStream", &method)),
            }
        })
    }
}

/// The adapter-side WebSocket stream exposed to the peer.
pub struct WebSocketStreamTarget(pub Arc<dyn WebSocketStream>);

impl WireTarget for WebSocketStreamTarget {
    fn call(
        self: Arc<Self>,
        _conn: WireConn,
        method: String,
        params: Value,
    ) -> BoxFuture<'static, Result<Value, BridgeError>> {
        Box::pin(async move {
            match method.as_str() {
                "sendBytes" => {
                    let message = bytes_field(&params, "message")?;
                    self.0.send_bytes(message).await.map(|_| Value::Null)
                }
                _ => Err(unknown_method("WebSocketStream", &method)),
            }
        })
    }
}

/// Pins a streaming body pump to the peer's capability table: it has no
/// methods, but releasing it drops the handle and cancels the pump.
pub struct HandleTarget {
    _handle: StreamHandle,
}

impl HandleTarget {
    pub fn new(handle: StreamHandle) -> HandleTarget {
        HandleTarget { _handle: handle }
    }
}

impl WireTarget for HandleTarget {
    fn call(
        self: Arc<Self>,
        _conn: WireConn,
        method: String,
        _params: Value,
    ) -> BoxFuture<'static, Result<Value, BridgeError>> {
        Box::pin(async move { Err(unknown_method("Handle", &method)) })
    }
}

/// An email session exposed to the peer.
pub struct EmailSessionTarget(pub Arc<dyn EmailSession>);

impl WireTarget for EmailSessionTarget {
    fn call(
        self: Arc<Self>,
        _conn: WireConn,
        method: String,
        params: Value,
    ) -> BoxFuture<'static, Result<Value, BridgeError>> {
        Box::pin(async move {
            match method.as_str() {
                "send" => {
                    let email = from_field(&params, "email")?;
                    self.0.send(email).await.map(|_| Value::Null)
                }
                _ => Err(unknown_method("EmailSession", &method)),
            }
        })
    }
}

/// Bootstrap target for the side-channel socket.
pub struct BridgeApiTarget(pub Arc<dyn BridgeApi>);

impl WireTarget for BridgeApiTarget {
    fn call(
        self: Arc<Self>,
        conn: WireConn,
        method: String,
        params: Value,
    ) -> BoxFuture<'static, Result<Value, BridgeError>> {
        Box::pin(async move {
            match method.as_str() {
                "getSandstormApi" => {
                    let api = self.0.get_sandstorm_api().await?;
                    let cap = conn.export(Arc::new(SandstormApiTarget(api)));
                    Ok(json!({ "api": cap_ref(cap) }))
                }
                "getSessionContext" => {
                    let id = str_field(&params, "id")?;
                    let context = self.0.get_session_context(id).await?;
                    let cap = conn.export(Arc::new(SessionContextTarget(context)));
                    Ok(json!({ "context": cap_ref(cap) }))
                }
                _ => Err(unknown_method("BridgeApi", &method)),
            }
        })
    }
}

/// Forwards arbitrary calls to a stored host context capability.
pub struct SessionContextTarget(pub Arc<dyn SessionContext>);

impl WireTarget for SessionContextTarget {
    fn call(
        self: Arc<Self>,
        _conn: WireConn,
        method: String,
        params: Value,
    ) -> BoxFuture<'static, Result<Value, BridgeError>> {
        Box::pin(async move { self.0.call(method, params).await })
    }
}

/// Forwards arbitrary calls to the host API capability.
pub struct SandstormApiTarget(pub Arc<dyn SandstormApi>);

impl WireTarget for SandstormApiTarget {
    fn call(
        self: Arc<Self>,
        _conn: WireConn,
        method: String,
        params: Value,
    ) -> BoxFuture<'static, Result<Value, BridgeError>> {
        Box::pin(async move { self.0.call(method, params).await })
    }
}
