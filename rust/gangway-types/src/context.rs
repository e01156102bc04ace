//! Per-call request context: cookies, accept lists, preconditions.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::services::ByteStream;

/// An entity tag, parsed from or rendered into HTTP `ETag` syntax.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ETag {
    pub value: String,
    pub weak: bool,
}

impl ETag {
    /// Render in HTTP header syntax: `"value"` or `W/"value"`.
    pub fn render(&self) -> String {
        if self.weak {
            format!("W/\"{}\"", self.value)
        } else {
            format!("\"{}\"", self.value)
        }
    }
}

/// Precondition attached to a call, rendered as `If-Match`/`If-None-Match`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ETagPrecondition {
    /// No precondition.
    #[default]
    None,
    /// The resource must exist (`If-Match: *`).
    Exists,
    /// The resource must not exist (`If-None-Match: *`).
    DoesntExist,
    /// The resource's ETag must be one of these.
    MatchesOneOf(Vec<ETag>),
    /// The resource's ETag must be none of these.
    MatchesNoneOf(Vec<ETag>),
}

/// One entry of the call's accept list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedType {
    pub mime_type: String,
    #[serde(default = "default_q_value")]
    pub q_value: f64,
}

fn default_q_value() -> f64 {
    1.0
}

/// A raw header the host wants forwarded verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

/// A request body payload for the non-streaming body-bearing verbs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Content {
    pub mime_type: String,
    pub content: Vec<u8>,
    pub encoding: Option<String>,
}

/// Depth of a PROPFIND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropfindDepth {
    Zero,
    One,
    #[default]
    Infinity,
}

impl PropfindDepth {
    /// The `Depth` header value.
    pub fn header_value(self) -> &'static str {
        match self {
            PropfindDepth::Zero => "0",
            PropfindDepth::One => "1",
            PropfindDepth::Infinity => "infinity",
        }
    }
}

/// Ambient context the host attaches to every session call.
///
/// The response stream, when present, is where a streaming 2xx body is
/// pumped; buffered responses never touch it.
#[derive(Clone, Default)]
pub struct CallContext {
    pub cookies: Vec<(String, String)>,
    pub response_stream: Option<Arc<dyn ByteStream>>,
    pub accept: Vec<AcceptedType>,
    pub etag_precondition: ETagPrecondition,
    pub additional_headers: Vec<HeaderEntry>,
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("cookies", &self.cookies)
            .field("response_stream", &self.response_stream.is_some())
            .field("accept", &self.accept)
            .field("etag_precondition", &self.etag_precondition)
            .field("additional_headers", &self.additional_headers)
            .finish()
    }
}
