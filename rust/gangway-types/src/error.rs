//! Error type shared across the adapter.

use thiserror::Error;

/// Errors raised by the adapter.
///
/// Every variant is fatal for the call that produced it; the adapter never
/// retries on its own. Downstream pump failures are logged and swallowed at
/// the pump, so they never surface here.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed HTTP from the application: bad framing, a missing required
    /// header, an invalid ETag, cookie date, or WebDAV destination.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The application answered with a status code outside the whitelist.
    /// Some codes have side effects inside the host UI and must not be
    /// forwarded blindly.
    #[error("app used unsupported HTTP status code {code} ({phrase:?})")]
    UnsupportedStatus { code: u16, phrase: String },

    /// A caller broke the call contract of a streaming capability, e.g.
    /// `write` after `done` or a declared-size mismatch.
    #[error("contract violation: {0}")]
    Contract(&'static str),

    /// The loopback connection to the application failed or died mid-call.
    #[error("connection to app failed: {0}")]
    Connection(#[source] std::io::Error),

    /// `getSessionContext` was asked about an id that is not live.
    #[error("session id {0:?} not found")]
    SessionNotFound(String),

    /// `newSession` was asked for a session type the adapter does not serve.
    #[error("unsupported session type {0:?}")]
    UnsupportedSessionType(String),

    /// The bridge config file is missing or malformed.
    #[error("invalid bridge config: {0}")]
    Config(String),

    /// Writing an incoming email into the maildir failed.
    #[error("mail delivery failed: {0}")]
    Mail(#[source] std::io::Error),

    /// A capability wire frame could not be encoded, decoded, or routed.
    #[error("capability wire error: {0}")]
    Wire(String),
}

impl BridgeError {
    /// Shorthand for a [`BridgeError::Protocol`] with a formatted message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        BridgeError::Protocol(msg.into())
    }

    /// Shorthand for a [`BridgeError::Wire`] with a formatted message.
    pub fn wire(msg: impl Into<String>) -> Self {
        BridgeError::Wire(msg.into())
    }
}
