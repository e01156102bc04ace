//! The gangway adapter.
//!
//! A supervising host delivers requests to a sandboxed legacy HTTP
//! application as typed capability calls. This crate launches the
//! application as a child process, translates each call into an HTTP/1.1
//! request over loopback TCP, parses the response, and projects it back
//! into the typed result the host expects. An out-of-band Unix socket
//! exposes a small introspection capability to the application itself.
//!
//! Module map:
//!
//! - [`gateway`] — session factory: the bootstrap capability the host calls
//! - [`session`] — the web/API session verbs
//! - [`streaming`] — upstream-streaming request handles
//! - [`pump`] — WebSocket byte pumps
//! - [`registry`] — the live session-context map
//! - [`bridge`] — the side-channel capability for the application
//! - [`mail`] — maildir delivery of injected email
//! - [`wire`] — the minimal two-party capability wire
//! - [`supervisor`] — child process lifecycle
//! - [`config`] — bridge config loading

pub mod bridge;
pub mod config;
pub mod gateway;
pub mod mail;
pub mod pump;
pub mod registry;
pub mod session;
pub mod streaming;
pub mod supervisor;
pub mod wire;
