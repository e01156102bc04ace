//! The closed set of typed response variants projected back to the host.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::services::WebSocketStream;

/// Success statuses the application is allowed to return.
///
/// Each enumerant carries its HTTP numeric annotation; the status table is
/// built by enumerating these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SuccessCode {
    Ok,
    Created,
    Accepted,
    MultiStatus,
}

impl SuccessCode {
    pub const ALL: [SuccessCode; 4] = [
        SuccessCode::Ok,
        SuccessCode::Created,
        SuccessCode::Accepted,
        SuccessCode::MultiStatus,
    ];

    /// The HTTP status code this enumerant is annotated with.
    pub fn http_status(self) -> u16 {
        match self {
            SuccessCode::Ok => 200,
            SuccessCode::Created => 201,
            SuccessCode::Accepted => 202,
            SuccessCode::MultiStatus => 207,
        }
    }
}

/// Client-error statuses the application is allowed to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientErrorCode {
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    Conflict,
    Gone,
    RequestEntityTooLarge,
    RequestUriTooLong,
    UnsupportedMediaType,
    ImATeapot,
    UnprocessableEntity,
}

impl ClientErrorCode {
    pub const ALL: [ClientErrorCode; 12] = [
        ClientErrorCode::BadRequest,
        ClientErrorCode::Forbidden,
        ClientErrorCode::NotFound,
        ClientErrorCode::MethodNotAllowed,
        ClientErrorCode::NotAcceptable,
        ClientErrorCode::Conflict,
        ClientErrorCode::Gone,
        ClientErrorCode::RequestEntityTooLarge,
        ClientErrorCode::RequestUriTooLong,
        ClientErrorCode::UnsupportedMediaType,
        ClientErrorCode::ImATeapot,
        ClientErrorCode::UnprocessableEntity,
    ];

    /// The HTTP status code this enumerant is annotated with.
    pub fn http_status(self) -> u16 {
        match self {
            ClientErrorCode::BadRequest => 400,
            ClientErrorCode::Forbidden => 403,
            ClientErrorCode::NotFound => 404,
            ClientErrorCode::MethodNotAllowed => 405,
            ClientErrorCode::NotAcceptable => 406,
            ClientErrorCode::Conflict => 409,
            ClientErrorCode::Gone => 410,
            ClientErrorCode::RequestEntityTooLarge => 413,
            ClientErrorCode::RequestUriTooLong => 414,
            ClientErrorCode::UnsupportedMediaType => 415,
            ClientErrorCode::ImATeapot => 418,
            ClientErrorCode::UnprocessableEntity => 422,
        }
    }
}

/// Expiry of a cookie as parsed from `Set-Cookie`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CookieExpires {
    #[default]
    Unset,
    /// Seconds since the epoch, UTC (`Expires=` attribute).
    Absolute(i64),
    /// Seconds from now (`Max-Age=` attribute).
    Relative(u64),
}

/// A cookie the application asked the host to set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub expires: CookieExpires,
    pub http_only: bool,
}

/// Handle keeping a streaming body pump alive.
///
/// The host holds this for as long as it wants the stream; dropping it
/// aborts the pump and with it the upstream socket.
#[derive(Debug)]
pub struct StreamHandle {
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        StreamHandle { task }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Body of a content response: buffered, or handed off to the response sink.
#[derive(Debug)]
pub enum ContentBody {
    Bytes(Vec<u8>),
    /// The body is being pumped into the call's response stream; the handle
    /// cancels the pump when dropped.
    Stream(StreamHandle),
}

/// A 2xx response.
#[derive(Debug)]
pub struct ContentResponse {
    pub status: SuccessCode,
    pub encoding: Option<String>,
    pub language: Option<String>,
    pub mime_type: Option<String>,
    pub etag: Option<crate::ETag>,
    /// Download filename from `Content-Disposition: attachment`.
    pub disposition_download: Option<String>,
    pub body: ContentBody,
}

/// The classified response, one variant per status class.
#[derive(Debug)]
pub enum ResponseVariant {
    Content(ContentResponse),
    NoContent {
        should_reset_form: bool,
    },
    PreconditionFailed {
        matching_etag: Option<crate::ETag>,
    },
    Redirect {
        is_permanent: bool,
        switch_to_get: bool,
        location: String,
    },
    ClientError {
        status: ClientErrorCode,
        description_html: Vec<u8>,
    },
    ServerError {
        description_html: Vec<u8>,
    },
}

/// The full typed result of a session call.
#[derive(Debug)]
pub struct Response {
    pub set_cookies: Vec<Cookie>,
    pub variant: ResponseVariant,
}

/// Result of a successful WebSocket open.
pub struct WebSocketAccept {
    /// Subprotocols the application accepted.
    pub protocol: Vec<String>,
    /// Capability for sending bytes toward the application.
    pub server_stream: Arc<dyn WebSocketStream>,
}

impl std::fmt::Debug for WebSocketAccept {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketAccept")
            .field("protocol", &self.protocol)
            .finish()
    }
}

/// WebDAV capabilities advertised by an OPTIONS response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DavOptions {
    pub dav_class1: bool,
    pub dav_class2: bool,
    pub dav_class3: bool,
    /// `DAV` tokens other than the numeric compliance classes.
    pub dav_extensions: Vec<String>,
}
