//! Incremental HTTP/1.1 response parsing.
//!
//! [`HttpResponseParser`] is driven over bytes pulled from an async stream.
//! [`HttpResponseParser::read_head`] reads until one of three conditions
//! holds: the response upgraded (the unread remainder is returned for the
//! follow-on protocol), the whole message is buffered, or a 2xx response
//! turned out to be streaming — headers complete, message not — in which
//! case the rest of the body is forwarded chunk-by-chunk into the call's
//! response sink by [`HttpResponseParser::pump_stream`].
//!
//! The parser is an explicit state machine: status line, then header lines
//! (with obs-fold continuations), then a body framed by `Transfer-Encoding:
//! chunked`, `Content-Length`, or connection close. Repeated header names
//! fold into one comma-joined value; `Set-Cookie` is peeled off into
//! structured cookies instead.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

use gangway_types::{
    BridgeError, ByteStream, ContentBody, ContentResponse, Cookie, DavOptions, ETag, Response,
    ResponseVariant, StreamHandle,
};

use crate::cookie::parse_set_cookie;
use crate::status::{classify, StatusClass};

/// Read granularity for both the head loop and the body pump.
const READ_CHUNK: usize = 4096;

/// Upper bound on any single header or chunk-size line.
const MAX_LINE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    StatusLine,
    Headers,
    Body,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkPhase {
    Size,
    Data(u64),
    DataEnd,
    Trailer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// No body follows the headers.
    None,
    ContentLength(u64),
    Chunked(ChunkPhase),
    /// Body runs until the connection closes.
    ToEof,
}

/// Decodes body bytes out of the raw input according to the framing chosen
/// at headers-complete. Shared between the head loop and the body pump so a
/// chunked body can be split across the streaming switch.
#[derive(Debug)]
struct BodyDecoder {
    framing: Framing,
}

impl BodyDecoder {
    /// Consume as much of `buf` as possible, appending decoded body bytes to
    /// `out`. Returns true once the message is complete.
    fn decode(&mut self, buf: &mut Vec<u8>, out: &mut Vec<u8>) -> Result<bool, BridgeError> {
        loop {
            match &mut self.framing {
                Framing::None => return Ok(true),
                Framing::ContentLength(remaining) => {
                    if *remaining == 0 {
                        return Ok(true);
                    }
                    if buf.is_empty() {
                        return Ok(false);
                    }
                    let take = (*remaining).min(buf.len() as u64) as usize;
                    out.extend_from_slice(&buf[..take]);
                    buf.drain(..take);
                    *remaining -= take as u64;
                    return Ok(*remaining == 0);
                }
                Framing::ToEof => {
                    out.append(buf);
                    return Ok(false);
                }
                Framing::Chunked(phase) => match phase {
                    ChunkPhase::Size => {
                        let Some(line) = take_line(buf)? else { return Ok(false) };
                        let size = parse_chunk_size(&line)?;
                        *phase = if size == 0 { ChunkPhase::Trailer } else { ChunkPhase::Data(size) };
                    }
                    ChunkPhase::Data(remaining) => {
                        if buf.is_empty() {
                            return Ok(false);
                        }
                        let take = (*remaining).min(buf.len() as u64) as usize;
                        out.extend_from_slice(&buf[..take]);
                        buf.drain(..take);
                        *remaining -= take as u64;
                        if *remaining == 0 {
                            *phase = ChunkPhase::DataEnd;
                        }
                    }
                    ChunkPhase::DataEnd => {
                        let Some(line) = take_line(buf)? else { return Ok(false) };
                        if !line.is_empty() {
                            return Err(BridgeError::protocol(
                                "chunk data not terminated by CRLF",
                            ));
                        }
                        *phase = ChunkPhase::Size;
                    }
                    ChunkPhase::Trailer => {
                        let Some(line) = take_line(buf)? else { return Ok(false) };
                        if line.is_empty() {
                            return Ok(true);
                        }
                        // Trailer fields are consumed and dropped.
                    }
                },
            }
        }
    }
}

/// Remove one CRLF- (or bare-LF-) terminated line from the front of `buf`.
///
/// `None` means the terminator has not arrived yet.
fn take_line(buf: &mut Vec<u8>) -> Result<Option<Vec<u8>>, BridgeError> {
    match buf.iter().position(|&b| b == b'\n') {
        Some(idx) => {
            let mut line: Vec<u8> = buf.drain(..=idx).collect();
            line.pop(); // the LF
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            Ok(Some(line))
        }
        None if buf.len() > MAX_LINE => {
            Err(BridgeError::protocol("response line exceeds maximum length"))
        }
        None => Ok(None),
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, BridgeError> {
    // Chunk extensions after ';' are ignored.
    let digits = match line.iter().position(|&b| b == b';') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let text = std::str::from_utf8(digits)
        .map_err(|_| BridgeError::protocol("non-ASCII chunk size"))?
        .trim();
    u64::from_str_radix(text, 16)
        .map_err(|_| BridgeError::protocol(format!("invalid chunk size {text:?}")))
}

/// Incremental HTTP/1.1 response parser. See the module docs for the
/// read/pump/build lifecycle.
pub struct HttpResponseParser {
    buf: Vec<u8>,
    state: ParseState,
    decoder: BodyDecoder,
    status_code: u16,
    status_phrase: String,
    raw_headers: Vec<(String, String)>,
    headers: HashMap<String, String>,
    cookies: Vec<Cookie>,
    body: Vec<u8>,
    headers_complete: bool,
    message_complete: bool,
    upgrade: bool,
    is_streaming: bool,
}

impl Default for HttpResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponseParser {
    pub fn new() -> Self {
        HttpResponseParser {
            buf: Vec::new(),
            state: ParseState::StatusLine,
            decoder: BodyDecoder { framing: Framing::None },
            status_code: 0,
            status_phrase: String::new(),
            raw_headers: Vec::new(),
            headers: HashMap::new(),
            cookies: Vec::new(),
            body: Vec::new(),
            headers_complete: false,
            message_complete: false,
            upgrade: false,
            is_streaming: false,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn is_upgrade(&self) -> bool {
        self.upgrade
    }

    /// Case-insensitive lookup in the folded header map.
    pub fn find_header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Read from `stream` until the response head is settled.
    ///
    /// Returns the bytes already read past the header terminator when the
    /// response is an upgrade (they belong to the next protocol), otherwise
    /// an empty buffer once either the whole message is buffered or a
    /// streaming 2xx has its headers.
    pub async fn read_head<S>(&mut self, stream: &mut S) -> Result<Vec<u8>, BridgeError>
    where
        S: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = stream.read(&mut chunk).await.map_err(BridgeError::Connection)?;
            if n > 0 {
                self.buf.extend_from_slice(&chunk[..n]);
                self.advance()?;
            }

            if self.upgrade {
                return Ok(std::mem::take(&mut self.buf));
            }
            if self.message_complete || n == 0 {
                if !self.headers_complete {
                    return Err(BridgeError::protocol(
                        "response from app had incomplete headers",
                    ));
                }
                // EOF ends a close-delimited (or truncated) body.
                self.message_complete = true;
                self.state = ParseState::Complete;
                return Ok(Vec::new());
            }
            if self.headers_complete && (200..300).contains(&self.status_code) {
                // Headers are in but the message keeps going: switch to
                // streaming exactly once.
                self.is_streaming = true;
                return Ok(Vec::new());
            }
        }
    }

    /// Hand the rest of a streaming body to a pump task feeding `sink`.
    ///
    /// Forwards anything already buffered, then keeps reading `stream` and
    /// writing chunks until the message completes or the connection closes,
    /// finally sending a single `done`. Returns `None` when the response is
    /// not streaming. The returned handle aborts the pump when dropped.
    pub fn pump_stream<S>(&mut self, stream: S, sink: Arc<dyn ByteStream>) -> Option<StreamHandle>
    where
        S: AsyncRead + Unpin + Send + 'static,
    {
        if !self.is_streaming {
            return None;
        }
        let initial = std::mem::take(&mut self.body);
        let leftover = std::mem::take(&mut self.buf);
        let decoder = std::mem::replace(&mut self.decoder, BodyDecoder { framing: Framing::None });
        self.state = ParseState::Complete;
        let task = tokio::spawn(run_body_pump(stream, sink, initial, leftover, decoder));
        Some(StreamHandle::new(task))
    }

    fn advance(&mut self) -> Result<(), BridgeError> {
        loop {
            match self.state {
                ParseState::StatusLine => {
                    let Some(line) = take_line(&mut self.buf)? else { return Ok(()) };
                    self.parse_status_line(&line)?;
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let Some(line) = take_line(&mut self.buf)? else { return Ok(()) };
                    if line.is_empty() {
                        self.on_headers_complete()?;
                        if self.state != ParseState::Body {
                            return Ok(());
                        }
                    } else {
                        self.on_header_line(&line)?;
                    }
                }
                ParseState::Body => {
                    let complete = self.decoder.decode(&mut self.buf, &mut self.body)?;
                    if complete {
                        self.message_complete = true;
                        self.state = ParseState::Complete;
                    }
                    return Ok(());
                }
                ParseState::Complete => return Ok(()),
            }
        }
    }

    fn parse_status_line(&mut self, line: &[u8]) -> Result<(), BridgeError> {
        let text = std::str::from_utf8(line)
            .map_err(|_| BridgeError::protocol("non-ASCII status line from app"))?;

        let rest = text
            .strip_prefix("HTTP/")
            .ok_or_else(|| BridgeError::protocol(format!("malformed status line {text:?}")))?;
        let mut parts = rest.splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        if !matches!(version, "1.0" | "1.1") {
            return Err(BridgeError::protocol(format!(
                "unsupported HTTP version {version:?}"
            )));
        }
        let code = parts
            .next()
            .and_then(|c| c.parse::<u16>().ok())
            .filter(|c| (100..1000).contains(c))
            .ok_or_else(|| BridgeError::protocol(format!("malformed status line {text:?}")))?;

        self.status_code = code;
        self.status_phrase = parts.next().unwrap_or("").to_owned();
        Ok(())
    }

    fn on_header_line(&mut self, line: &[u8]) -> Result<(), BridgeError> {
        if line[0] == b' ' || line[0] == b'\t' {
            // obs-fold: continuation of the previous value.
            let (_, value) = self.raw_headers.last_mut().ok_or_else(|| {
                BridgeError::protocol("header continuation without a header")
            })?;
            value.push(' ');
            value.push_str(String::from_utf8_lossy(line).trim());
            return Ok(());
        }

        let colon = line.iter().position(|&b| b == b':').ok_or_else(|| {
            BridgeError::protocol(format!(
                "malformed header line {:?}",
                String::from_utf8_lossy(line)
            ))
        })?;
        let name = String::from_utf8_lossy(&line[..colon]).trim().to_owned();
        if name.is_empty() {
            return Err(BridgeError::protocol("empty header name"));
        }
        let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_owned();
        self.raw_headers.push((name, value));
        Ok(())
    }

    fn on_headers_complete(&mut self) -> Result<(), BridgeError> {
        for (name, value) in std::mem::take(&mut self.raw_headers) {
            let name = name.to_ascii_lowercase();
            if name == "set-cookie" {
                self.cookies.push(parse_set_cookie(&value)?);
            } else {
                match self.headers.get_mut(&name) {
                    // Repeated fields are equivalent to comma-delimited.
                    Some(existing) => {
                        existing.push_str(", ");
                        existing.push_str(&value);
                    }
                    None => {
                        self.headers.insert(name, value);
                    }
                }
            }
        }
        self.headers_complete = true;

        if self.status_code == 101 {
            self.upgrade = true;
            self.state = ParseState::Complete;
            return Ok(());
        }

        if self.status_code == 204
            || self.status_code == 304
            || (100..200).contains(&self.status_code)
        {
            self.message_complete = true;
            self.state = ParseState::Complete;
            return Ok(());
        }

        self.decoder.framing = if self
            .find_header("transfer-encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"))
        {
            Framing::Chunked(ChunkPhase::Size)
        } else if let Some(length) = self.find_header("content-length") {
            let length: u64 = length.trim().parse().map_err(|_| {
                BridgeError::protocol(format!("invalid Content-Length {length:?}"))
            })?;
            if length == 0 {
                self.message_complete = true;
                self.state = ParseState::Complete;
                return Ok(());
            }
            Framing::ContentLength(length)
        } else {
            Framing::ToEof
        };
        self.state = ParseState::Body;
        Ok(())
    }

    /// Project the accumulated state into a typed response.
    ///
    /// `handle` is the pump handle of a streaming body; buffered responses
    /// pass `None`.
    pub fn build_content(
        &mut self,
        handle: Option<StreamHandle>,
    ) -> Result<Response, BridgeError> {
        if self.upgrade {
            return Err(BridgeError::protocol(
                "app attempted to upgrade protocol when client did not request this",
            ));
        }

        let class = match classify(self.status_code) {
            Some(class) => class,
            // Unknown 4xx degrades to a generic bad request; unknown 5xx is
            // still a server error. Anything else is off the whitelist.
            None if (400..500).contains(&self.status_code) => {
                StatusClass::ClientError(gangway_types::ClientErrorCode::BadRequest)
            }
            None if (500..600).contains(&self.status_code) => {
                let description_html = std::mem::take(&mut self.body);
                return Ok(Response {
                    set_cookies: std::mem::take(&mut self.cookies),
                    variant: ResponseVariant::ServerError { description_html },
                });
            }
            None => {
                return Err(BridgeError::UnsupportedStatus {
                    code: self.status_code,
                    phrase: self.status_phrase.clone(),
                })
            }
        };

        let set_cookies = std::mem::take(&mut self.cookies);

        let variant = match class {
            StatusClass::Content(status) => {
                let etag = match self.find_header("etag") {
                    Some(raw) => Some(parse_etag(raw)?),
                    None => None,
                };
                let body = if self.is_streaming {
                    match handle {
                        Some(handle) => ContentBody::Stream(handle),
                        None => {
                            return Err(BridgeError::protocol(
                                "streaming response lost its pump handle",
                            ))
                        }
                    }
                } else {
                    ContentBody::Bytes(std::mem::take(&mut self.body))
                };
                ResponseVariant::Content(ContentResponse {
                    status,
                    encoding: self.find_header("content-encoding").map(str::to_owned),
                    language: self.find_header("content-language").map(str::to_owned),
                    mime_type: self.find_header("content-type").map(str::to_owned),
                    etag,
                    disposition_download: self
                        .find_header("content-disposition")
                        .and_then(parse_attachment_filename),
                    body,
                })
            }
            StatusClass::NoContent { should_reset_form } => {
                ResponseVariant::NoContent { should_reset_form }
            }
            StatusClass::PreconditionFailed => {
                let matching_etag = match self.find_header("etag") {
                    Some(raw) => Some(parse_etag(raw)?),
                    None => None,
                };
                ResponseVariant::PreconditionFailed { matching_etag }
            }
            StatusClass::Redirect { is_permanent, switch_to_get } => {
                let location = self.find_header("location").ok_or_else(|| {
                    BridgeError::protocol(format!(
                        "app returned redirect {} missing Location header",
                        self.status_code
                    ))
                })?;
                ResponseVariant::Redirect {
                    is_permanent,
                    switch_to_get,
                    location: location.to_owned(),
                }
            }
            StatusClass::ClientError(status) => ResponseVariant::ClientError {
                status,
                description_html: std::mem::take(&mut self.body),
            },
        };

        Ok(Response { set_cookies, variant })
    }

    /// Accepted subprotocols of a switch-protocols response.
    ///
    /// The response must be a 101; an app answering a WebSocket open with
    /// anything else does not speak WebSocket.
    pub fn build_for_web_socket(&self) -> Result<Vec<String>, BridgeError> {
        if self.status_code != 101 {
            return Err(BridgeError::protocol(format!(
                "app does not support WebSocket (status {} {:?})",
                self.status_code, self.status_phrase
            )));
        }
        Ok(self
            .find_header("sec-websocket-protocol")
            .map(|header| header.split(',').map(|p| p.trim().to_owned()).collect())
            .unwrap_or_default())
    }

    /// WebDAV options from the `DAV` header.
    pub fn build_options(&self) -> Result<DavOptions, BridgeError> {
        if self.upgrade {
            return Err(BridgeError::protocol(
                "app attempted to upgrade protocol when client did not request this",
            ));
        }
        let mut options = DavOptions::default();
        if let Some(dav) = self.find_header("dav") {
            for level in dav.split(',') {
                match level.trim() {
                    "" => {}
                    "1" => options.dav_class1 = true,
                    "2" => options.dav_class2 = true,
                    "3" => options.dav_class3 = true,
                    extension => options.dav_extensions.push(extension.to_owned()),
                }
            }
        }
        Ok(options)
    }
}

async fn run_body_pump<S>(
    stream: S,
    sink: Arc<dyn ByteStream>,
    initial: Vec<u8>,
    leftover: Vec<u8>,
    decoder: BodyDecoder,
) where
    S: AsyncRead + Unpin,
{
    if let Err(error) = body_pump(stream, sink, initial, leftover, decoder).await {
        // The host-side stream must tolerate truncation; acks are the
        // application protocol's responsibility.
        warn!(%error, "response body pump failed");
    }
}

async fn body_pump<S>(
    mut stream: S,
    sink: Arc<dyn ByteStream>,
    initial: Vec<u8>,
    mut buf: Vec<u8>,
    mut decoder: BodyDecoder,
) -> Result<(), BridgeError>
where
    S: AsyncRead + Unpin,
{
    let mut out = initial;
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let complete = decoder.decode(&mut buf, &mut out)?;
        if !out.is_empty() {
            // Awaiting the sink write is the backpressure bound: at most one
            // chunk is in flight.
            sink.write(std::mem::take(&mut out)).await?;
        }
        if complete {
            break;
        }
        let n = stream.read(&mut chunk).await.map_err(BridgeError::Connection)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    sink.done().await
}

/// Parse an `ETag` header: `"value"` or `W/"value"`, backslash escapes
/// stripped. Anything else fails the call.
pub fn parse_etag(input: &str) -> Result<ETag, BridgeError> {
    let mut input = input.trim();
    let mut weak = false;
    if let Some(rest) = input.strip_prefix("W/") {
        weak = true;
        input = rest;
    }

    if input.len() < 2 || !input.starts_with('"') || !input.ends_with('"') {
        return Err(BridgeError::protocol(format!(
            "app returned invalid ETag header {input:?}"
        )));
    }

    let inner = &input[1..input.len() - 1];
    let mut value = String::with_capacity(inner.len());
    let mut escaped = false;
    for c in inner.chars() {
        if escaped {
            escaped = false;
        } else {
            if c == '"' {
                return Err(BridgeError::protocol(format!(
                    "app returned invalid ETag header {input:?}"
                )));
            }
            if c == '\\' {
                escaped = true;
                continue;
            }
        }
        value.push(c);
    }

    Ok(ETag { value, weak })
}

/// Extract the download filename out of `Content-Disposition: attachment`.
///
/// Quoted filenames are unescaped per RFC 822: a backslash followed by any
/// character is that character. An unquoted value is taken as-is — buggy
/// apps forget the quotes.
fn parse_attachment_filename(disposition: &str) -> Option<String> {
    let mut parts = disposition.split(';');
    if parts.next().map(str::trim) != Some("attachment") {
        return None;
    }

    let mut download = None;
    for part in parts {
        let Some(eq) = part.find('=') else { continue };
        if part[..eq].trim() != "filename" {
            continue;
        }
        let value = part[eq + 1..].trim();
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            let inner = &value[1..value.len() - 1];
            let mut unescaped = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    match chars.next() {
                        Some(next) => unescaped.push(next),
                        None => break,
                    }
                } else {
                    unescaped.push(c);
                }
            }
            download = Some(unescaped);
        } else {
            download = Some(value.to_owned());
        }
    }
    download
}
