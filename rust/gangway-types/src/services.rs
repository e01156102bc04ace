//! Capability traits at the host/adapter seam.
//!
//! Capabilities are modelled as `Arc<dyn Trait>`: the reference count is the
//! capability's lifetime, and dropping the last clone releases it. Methods
//! return [`BoxFuture`] so the traits stay dyn-compatible.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

use crate::{
    BoxFuture, BridgeError, CallContext, Content, DavOptions, EmailMessage, PropfindDepth,
    Response, UserInfo, ViewInfo, WebSocketAccept,
};

/// A host-provided sink that accepts a sequence of byte chunks and a
/// terminal `done`. Streaming response bodies are pumped into one of these.
pub trait ByteStream: Send + Sync {
    fn write(&self, data: Vec<u8>) -> BoxFuture<'_, Result<(), BridgeError>>;
    fn done(&self) -> BoxFuture<'_, Result<(), BridgeError>>;
    fn expect_size(&self, size: u64) -> BoxFuture<'_, Result<(), BridgeError>>;
}

/// One direction of a WebSocket: a stream of raw byte datagrams.
///
/// Sends are one-way; delivery acknowledgements are the application
/// protocol's business.
pub trait WebSocketStream: Send + Sync {
    fn send_bytes(&self, message: Vec<u8>) -> BoxFuture<'_, Result<(), BridgeError>>;
}

/// The host-side context for one session. Opaque to the adapter: it is
/// stored in the session registry and handed back to the application via
/// the side channel, which forwards calls on it without interpreting them.
pub trait SessionContext: Send + Sync {
    fn call(
        &self,
        method: String,
        params: serde_json::Value,
    ) -> BoxFuture<'_, Result<serde_json::Value, BridgeError>>;
}

/// The host's API bootstrap capability, likewise opaque to the adapter.
pub trait SandstormApi: Send + Sync {
    fn call(
        &self,
        method: String,
        params: serde_json::Value,
    ) -> BoxFuture<'_, Result<serde_json::Value, BridgeError>>;
}

/// An upstream-streaming request, as returned by `postStreaming` and
/// `putStreaming`. Extends the sink surface with response retrieval; the
/// response may be requested before the upload completes.
pub trait RequestStream: ByteStream {
    fn get_response(&self) -> BoxFuture<'_, Result<Response, BridgeError>>;
}

/// The full set of verbs a web or API session answers.
pub trait WebSession: Send + Sync {
    /// GET, or HEAD when `ignore_body` is set.
    fn get(
        &self,
        path: String,
        context: CallContext,
        ignore_body: bool,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn post(
        &self,
        path: String,
        content: Content,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn put(
        &self,
        path: String,
        content: Content,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn patch(
        &self,
        path: String,
        content: Content,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn delete(
        &self,
        path: String,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn propfind(
        &self,
        path: String,
        xml_content: String,
        depth: PropfindDepth,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn proppatch(
        &self,
        path: String,
        xml_content: String,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn mkcol(
        &self,
        path: String,
        content: Content,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn copy(
        &self,
        path: String,
        destination: String,
        no_overwrite: bool,
        shallow: bool,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn move_(
        &self,
        path: String,
        destination: String,
        no_overwrite: bool,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn lock(
        &self,
        path: String,
        xml_content: String,
        shallow: bool,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn unlock(
        &self,
        path: String,
        lock_token: String,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn acl(
        &self,
        path: String,
        xml_content: String,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn report(
        &self,
        path: String,
        content: Content,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>>;

    fn options(
        &self,
        path: String,
        context: CallContext,
    ) -> BoxFuture<'_, Result<DavOptions, BridgeError>>;

    fn post_streaming(
        &self,
        path: String,
        mime_type: String,
        encoding: Option<String>,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Arc<dyn RequestStream>, BridgeError>>;

    fn put_streaming(
        &self,
        path: String,
        mime_type: String,
        encoding: Option<String>,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Arc<dyn RequestStream>, BridgeError>>;

    fn open_web_socket(
        &self,
        path: String,
        context: CallContext,
        protocols: Vec<String>,
        client_stream: Arc<dyn WebSocketStream>,
    ) -> BoxFuture<'_, Result<WebSocketAccept, BridgeError>>;
}

/// An email session: the host pushes incoming messages through this.
pub trait EmailSession: Send + Sync {
    fn send(&self, email: EmailMessage) -> BoxFuture<'_, Result<(), BridgeError>>;
}

/// Parameters for a web session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebSessionParams {
    pub base_path: String,
    pub user_agent: String,
    pub acceptable_languages: Vec<String>,
}

/// Parameters for an API session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiSessionParams {
    pub remote_address: Option<IpAddr>,
}

/// Type-specific parameters carried by a `newSession` request.
#[derive(Debug, Clone, Default)]
pub enum SessionParams {
    #[default]
    None,
    Web(WebSessionParams),
    Api(ApiSessionParams),
}

impl SessionParams {
    /// The web params, or defaults when the host sent none.
    pub fn web(&self) -> WebSessionParams {
        match self {
            SessionParams::Web(p) => p.clone(),
            _ => WebSessionParams::default(),
        }
    }

    /// The API params, or defaults when the host sent none.
    pub fn api(&self) -> ApiSessionParams {
        match self {
            SessionParams::Api(p) => p.clone(),
            _ => ApiSessionParams::default(),
        }
    }
}

/// A `newSession` request from the host.
#[derive(Clone)]
pub struct SessionRequest {
    /// Requested session-type identifier: `"web"`, `"api"` or `"email"`.
    pub session_type: String,
    pub user_info: UserInfo,
    pub context: Arc<dyn SessionContext>,
    /// Opaque tab identifier, hex-encoded into `X-Sandstorm-Tab-Id`.
    pub tab_id: Vec<u8>,
    pub params: SessionParams,
}

impl std::fmt::Debug for SessionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRequest")
            .field("session_type", &self.session_type)
            .field("user_info", &self.user_info)
            .field("tab_id", &self.tab_id)
            .field("params", &self.params)
            .finish()
    }
}

/// A freshly constructed session capability.
pub enum Session {
    Web(Arc<dyn WebSession>),
    Email(Arc<dyn EmailSession>),
}

/// The bootstrap capability the host talks to: view info and sessions.
pub trait MainView: Send + Sync {
    fn get_view_info(&self) -> BoxFuture<'_, Result<ViewInfo, BridgeError>>;
    fn new_session(
        &self,
        request: SessionRequest,
    ) -> BoxFuture<'_, Result<Session, BridgeError>>;
}

/// The capability exposed to the application over the side channel.
pub trait BridgeApi: Send + Sync {
    /// The host API capability.
    fn get_sandstorm_api(&self) -> BoxFuture<'_, Result<Arc<dyn SandstormApi>, BridgeError>>;
    /// The host context for the session named by an
    /// `X-Sandstorm-Session-Id` value, or a lookup error.
    fn get_session_context(
        &self,
        id: String,
    ) -> BoxFuture<'_, Result<Arc<dyn SessionContext>, BridgeError>>;
}
