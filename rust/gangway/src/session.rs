//! Web and API session implementation.
//!
//! Every verb follows the same path: synthesize the request head from the
//! session identity plus call context, open a fresh loopback connection to
//! the app, write the request, and run the response parser. The session
//! never reuses a connection — `Connection: close` is part of the request —
//! and never half-closes after sending, because some HTTP servers drop the
//! whole socket on EOF even with a response still queued.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use gangway_http::{request, HttpResponseParser};
use gangway_types::{
    BoxFuture, BridgeError, ByteStream, CallContext, Content, DavOptions, PropfindDepth,
    RequestStream, Response, SessionContext, SessionIdentity, UserInfo, WebSession,
    WebSocketAccept, WebSocketStream,
};

use crate::pump::WebSocketPump;
use crate::registry::SessionRegistry;
use crate::streaming::RequestStreamImpl;

/// Discards a response body. Used where the bridge has no interest in the
/// bytes (OPTIONS, streaming responses with no host sink).
pub struct IgnoreSink;

impl ByteStream for IgnoreSink {
    fn write(&self, _data: Vec<u8>) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async { Ok(()) })
    }
    fn done(&self) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async { Ok(()) })
    }
    fn expect_size(&self, _size: u64) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async { Ok(()) })
    }
}

/// One web or API session, serving requests against the app's loopback port.
///
/// Owns its slot in the session registry: constructed sessions are visible
/// to the side channel, dropped sessions are not.
pub struct WebSessionImpl {
    port: u16,
    identity: SessionIdentity,
    registry: Arc<SessionRegistry>,
}

impl WebSessionImpl {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        port: u16,
        registry: Arc<SessionRegistry>,
        user_info: &UserInfo,
        context: Arc<dyn SessionContext>,
        session_id: String,
        tab_id: &[u8],
        base_path: String,
        user_agent: String,
        accept_languages: String,
        root_path: String,
        permissions: String,
        remote_address: Option<String>,
    ) -> Result<Arc<WebSessionImpl>, BridgeError> {
        let identity = SessionIdentity {
            session_id: session_id.clone(),
            tab_id: gangway_types::hex_encode(tab_id),
            user_display_name: gangway_types::percent_encode(&user_info.display_name),
            user_id: SessionIdentity::user_id_from_digest(&user_info.identity_id)?,
            user_handle: user_info.preferred_handle.clone(),
            user_picture: user_info.picture_url.clone(),
            user_pronouns: user_info.pronouns,
            permissions,
            base_path,
            user_agent,
            accept_languages,
            root_path,
            remote_address,
        };
        registry.insert(session_id, context);
        Ok(Arc::new(WebSessionImpl { port, identity, registry }))
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    async fn connect(&self) -> Result<TcpStream, BridgeError> {
        TcpStream::connect(("127.0.0.1", self.port))
            .await
            .map_err(BridgeError::Connection)
    }

    /// The shared verb path: write the request, parse, project.
    async fn send_request(
        &self,
        head: String,
        body: &[u8],
        context: CallContext,
    ) -> Result<Response, BridgeError> {
        debug!(session = %self.identity.session_id, head = %first_line(&head), "forwarding request");
        let mut stream = self.connect().await?;

        let mut request_bytes = Vec::with_capacity(head.len() + body.len());
        request_bytes.extend_from_slice(head.as_bytes());
        request_bytes.extend_from_slice(body);
        stream
            .write_all(&request_bytes)
            .await
            .map_err(BridgeError::Connection)?;

        let mut parser = HttpResponseParser::new();
        let remainder = parser.read_head(&mut stream).await?;
        debug_assert!(remainder.is_empty() || parser.is_upgrade());

        let sink = context
            .response_stream
            .clone()
            .unwrap_or_else(|| Arc::new(IgnoreSink));
        let handle = parser.pump_stream(stream, sink);
        parser.build_content(handle)
    }

    /// OPTIONS path: the body is discarded, the DAV header is the result.
    async fn send_options_request(
        &self,
        head: String,
    ) -> Result<DavOptions, BridgeError> {
        let mut stream = self.connect().await?;
        stream
            .write_all(head.as_bytes())
            .await
            .map_err(BridgeError::Connection)?;

        let mut parser = HttpResponseParser::new();
        parser.read_head(&mut stream).await?;
        let _pump = parser.pump_stream(stream, Arc::new(IgnoreSink));
        parser.build_options()
    }

    async fn open_request_stream(
        &self,
        head: String,
        context: CallContext,
    ) -> Result<Arc<dyn RequestStream>, BridgeError> {
        let stream = self.connect().await?;
        Ok(RequestStreamImpl::new(head, stream, context.response_stream.clone())
            as Arc<dyn RequestStream>)
    }

    fn content_headers(content: &Content) -> Vec<String> {
        let mut headers = vec![
            format!("Content-Type: {}", content.mime_type),
            format!("Content-Length: {}", content.content.len()),
        ];
        if let Some(encoding) = &content.encoding {
            headers.push(format!("Content-Encoding: {encoding}"));
        }
        headers
    }

    fn xml_headers(xml: &str) -> Vec<String> {
        vec![
            "Content-Type: application/xml;charset=utf-8".to_owned(),
            format!("Content-Length: {}", xml.len()),
        ]
    }
}

impl Drop for WebSessionImpl {
    fn drop(&mut self) {
        self.registry.remove(&self.identity.session_id);
    }
}

fn first_line(head: &str) -> &str {
    head.split("\r\n").next().unwrap_or(head)
}

impl WebSession for WebSessionImpl {
    fn get(
        &self,
        path: String,
        context: CallContext,
        ignore_body: bool,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let method = if ignore_body { "HEAD" } else { "GET" };
            let head = request::make_headers(method, &path, &self.identity, &context, &[]);
            self.send_request(head, &[], context).await
        })
    }

    fn post(
        &self,
        path: String,
        content: Content,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let extra = Self::content_headers(&content);
            let head = request::make_headers("POST", &path, &self.identity, &context, &extra);
            self.send_request(head, &content.content, context).await
        })
    }

    fn put(
        &self,
        path: String,
        content: Content,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let extra = Self::content_headers(&content);
            let head = request::make_headers("PUT", &path, &self.identity, &context, &extra);
            self.send_request(head, &content.content, context).await
        })
    }

    fn patch(
        &self,
        path: String,
        content: Content,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let extra = Self::content_headers(&content);
            let head = request::make_headers("PATCH", &path, &self.identity, &context, &extra);
            self.send_request(head, &content.content, context).await
        })
    }

    fn delete(
        &self,
        path: String,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let head = request::make_headers("DELETE", &path, &self.identity, &context, &[]);
            self.send_request(head, &[], context).await
        })
    }

    fn propfind(
        &self,
        path: String,
        xml_content: String,
        depth: PropfindDepth,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let mut extra = Self::xml_headers(&xml_content);
            extra.push(format!("Depth: {}", depth.header_value()));
            let head = request::make_headers("PROPFIND", &path, &self.identity, &context, &extra);
            self.send_request(head, xml_content.as_bytes(), context).await
        })
    }

    fn proppatch(
        &self,
        path: String,
        xml_content: String,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let extra = Self::xml_headers(&xml_content);
            let head = request::make_headers("PROPPATCH", &path, &self.identity, &context, &extra);
            self.send_request(head, xml_content.as_bytes(), context).await
        })
    }

    fn mkcol(
        &self,
        path: String,
        content: Content,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let extra = Self::content_headers(&content);
            let head = request::make_headers("MKCOL", &path, &self.identity, &context, &extra);
            self.send_request(head, &content.content, context).await
        })
    }

    fn copy(
        &self,
        path: String,
        destination: String,
        no_overwrite: bool,
        shallow: bool,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let extra = vec![
                request::make_destination_header(&self.identity.base_path, &destination)?,
                request::make_overwrite_header(no_overwrite),
                request::make_depth_header(shallow),
            ];
            let head = request::make_headers("COPY", &path, &self.identity, &context, &extra);
            self.send_request(head, &[], context).await
        })
    }

    fn move_(
        &self,
        path: String,
        destination: String,
        no_overwrite: bool,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let extra = vec![
                request::make_destination_header(&self.identity.base_path, &destination)?,
                request::make_overwrite_header(no_overwrite),
            ];
            let head = request::make_headers("MOVE", &path, &self.identity, &context, &extra);
            self.send_request(head, &[], context).await
        })
    }

    fn lock(
        &self,
        path: String,
        xml_content: String,
        shallow: bool,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let mut extra = Self::xml_headers(&xml_content);
            extra.push(request::make_depth_header(shallow));
            let head = request::make_headers("LOCK", &path, &self.identity, &context, &extra);
            self.send_request(head, xml_content.as_bytes(), context).await
        })
    }

    fn unlock(
        &self,
        path: String,
        lock_token: String,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let extra = vec![format!("Lock-Token: {lock_token}")];
            let head = request::make_headers("UNLOCK", &path, &self.identity, &context, &extra);
            self.send_request(head, &[], context).await
        })
    }

    fn acl(
        &self,
        path: String,
        xml_content: String,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let extra = Self::xml_headers(&xml_content);
            let head = request::make_headers("ACL", &path, &self.identity, &context, &extra);
            self.send_request(head, xml_content.as_bytes(), context).await
        })
    }

    fn report(
        &self,
        path: String,
        content: Content,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Response, BridgeError>> {
        Box::pin(async move {
            let extra = Self::content_headers(&content);
            let head = request::make_headers("REPORT", &path, &self.identity, &context, &extra);
            self.send_request(head, &content.content, context).await
        })
    }

    fn options(
        &self,
        path: String,
        context: CallContext,
    ) -> BoxFuture<'_, Result<DavOptions, BridgeError>> {
        Box::pin(async move {
            let head = request::make_headers("OPTIONS", &path, &self.identity, &context, &[]);
            self.send_options_request(head).await
        })
    }

    fn post_streaming(
        &self,
        path: String,
        mime_type: String,
        encoding: Option<String>,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Arc<dyn RequestStream>, BridgeError>> {
        Box::pin(async move {
            let mut extra = vec![format!("Content-Type: {mime_type}")];
            if let Some(encoding) = &encoding {
                extra.push(format!("Content-Encoding: {encoding}"));
            }
            let head = request::make_headers("POST", &path, &self.identity, &context, &extra);
            self.open_request_stream(head, context).await
        })
    }

    fn put_streaming(
        &self,
        path: String,
        mime_type: String,
        encoding: Option<String>,
        context: CallContext,
    ) -> BoxFuture<'_, Result<Arc<dyn RequestStream>, BridgeError>> {
        Box::pin(async move {
            let mut extra = vec![format!("Content-Type: {mime_type}")];
            if let Some(encoding) = &encoding {
                extra.push(format!("Content-Encoding: {encoding}"));
            }
            let head = request::make_headers("PUT", &path, &self.identity, &context, &extra);
            self.open_request_stream(head, context).await
        })
    }

    fn open_web_socket(
        &self,
        path: String,
        context: CallContext,
        protocols: Vec<String>,
        client_stream: Arc<dyn WebSocketStream>,
    ) -> BoxFuture<'_, Result<WebSocketAccept, BridgeError>> {
        Box::pin(async move {
            let head =
                request::make_websocket_headers(&path, &self.identity, &context, &protocols);
            let mut stream = self.connect().await?;
            stream
                .write_all(head.as_bytes())
                .await
                .map_err(BridgeError::Connection)?;

            let mut parser = HttpResponseParser::new();
            let remainder = parser.read_head(&mut stream).await?;
            let protocol = parser.build_for_web_socket()?;

            let pump = WebSocketPump::start(stream, client_stream, remainder);
            Ok(WebSocketAccept { protocol, server_stream: pump })
        })
    }
}
