#![deny(unsafe_code)]

//! Typed protocol surface for the gangway adapter.
//!
//! The host delivers requests to a sandboxed application as typed capability
//! calls; the adapter replays them as HTTP/1.1 against the application and
//! projects the responses back into the closed set of variants defined here.
//! This crate holds the data model shared by every other gangway crate plus
//! the capability traits at the host/adapter seam. It contains no I/O.

mod config;
mod context;
mod email;
mod error;
mod identity;
mod response;
mod services;

pub use config::{BridgeConfig, PermissionDef, ViewInfo};
pub use context::{
    AcceptedType, CallContext, Content, ETag, ETagPrecondition, HeaderEntry, PropfindDepth,
};
pub use email::{EmailAddress, EmailAttachment, EmailMessage};
pub use error::BridgeError;
pub use identity::{hex_encode, percent_encode, Pronouns, SessionIdentity, UserInfo};
pub use response::{
    ClientErrorCode, ContentBody, ContentResponse, Cookie, CookieExpires, DavOptions, Response,
    ResponseVariant, StreamHandle, SuccessCode, WebSocketAccept,
};
pub use services::{
    ApiSessionParams, BridgeApi, ByteStream, EmailSession, MainView, RequestStream,
    SandstormApi, Session, SessionContext, SessionParams, SessionRequest, WebSession,
    WebSessionParams, WebSocketStream,
};

use std::future::Future;
use std::pin::Pin;

/// Boxed future type for dyn-compatible async capability methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
