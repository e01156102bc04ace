#![deny(unsafe_code)]

//! HTTP/1.1 mechanics for the gangway adapter.
//!
//! This crate turns typed session calls into raw HTTP/1.1 request bytes and
//! parses the application's responses back into the typed variants of
//! [`gangway_types`]:
//!
//! - [`status`] — the whitelist mapping from numeric status to response class
//! - [`request`] — request line and header block synthesis
//! - [`cookie`] — `Set-Cookie` parsing, including the five accepted
//!   `Expires` date formats
//! - [`parser`] — the incremental response parser with its
//!   streaming/upgrade decision logic and body pump

pub mod cookie;
pub mod parser;
pub mod request;
pub mod status;

pub use parser::HttpResponseParser;
pub use status::{classify, StatusClass};
