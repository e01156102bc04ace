//! HTTP/1.1 request synthesis.
//!
//! Requests are rendered as a complete line list joined with CRLF, ending in
//! the blank line; body bytes (when any) are appended by the caller. One
//! request per connection, so `Connection: close` is always sent.

use gangway_types::{BridgeError, CallContext, ETagPrecondition, SessionIdentity};

/// Compose the request line and header block for an ordinary verb.
///
/// `extra_headers` come first after `Connection: close` so verb-specific
/// headers (`Content-Type`, `Depth`, ...) stay grouped at the top.
pub fn make_headers(
    method: &str,
    path: &str,
    identity: &SessionIdentity,
    context: &CallContext,
    extra_headers: &[String],
) -> String {
    let mut lines = Vec::with_capacity(16);

    lines.push(format!("{} {}{} HTTP/1.1", method, identity.root_path, path));
    lines.push("Connection: close".to_owned());
    for header in extra_headers {
        lines.push(header.clone());
    }
    lines.push("Accept-Encoding: gzip".to_owned());
    if !identity.accept_languages.is_empty() {
        lines.push(format!("Accept-Language: {}", identity.accept_languages));
    }

    add_common_headers(&mut lines, identity, context);

    lines.join("\r\n")
}

/// Compose the upgrade request for `openWebSocket`.
///
/// The key is fixed: the adapter is not trying to defeat caching proxies on
/// a loopback connection, and the handshake hash is not checked either.
pub fn make_websocket_headers(
    path: &str,
    identity: &SessionIdentity,
    context: &CallContext,
    protocols: &[String],
) -> String {
    let mut lines = Vec::with_capacity(16);

    lines.push(format!("GET {}{} HTTP/1.1", identity.root_path, path));
    lines.push("Upgrade: websocket".to_owned());
    lines.push("Connection: Upgrade".to_owned());
    lines.push("Sec-WebSocket-Key: mj9i153gxeYNlGDoKdoXOQ==".to_owned());
    if !protocols.is_empty() {
        lines.push(format!("Sec-WebSocket-Protocol: {}", protocols.join(", ")));
    }
    lines.push("Sec-WebSocket-Version: 13".to_owned());

    add_common_headers(&mut lines, identity, context);

    lines.join("\r\n")
}

/// The identity and context headers shared by every request, terminated by
/// the blank line.
fn add_common_headers(lines: &mut Vec<String>, identity: &SessionIdentity, context: &CallContext) {
    if !identity.user_agent.is_empty() {
        lines.push(format!("User-Agent: {}", identity.user_agent));
    }
    lines.push(format!("X-Sandstorm-Tab-Id: {}", identity.tab_id));
    lines.push(format!("X-Sandstorm-Username: {}", identity.user_display_name));
    if let Some(user_id) = &identity.user_id {
        lines.push(format!("X-Sandstorm-User-Id: {user_id}"));

        // The user is logged in, so their profile details ride along.
        if !identity.user_handle.is_empty() {
            lines.push(format!("X-Sandstorm-Preferred-Handle: {}", identity.user_handle));
        }
        if !identity.user_picture.is_empty() {
            lines.push(format!("X-Sandstorm-User-Picture: {}", identity.user_picture));
        }
        if identity.user_pronouns != gangway_types::Pronouns::Neutral {
            lines.push(format!(
                "X-Sandstorm-User-Pronouns: {}",
                identity.user_pronouns.name()
            ));
        }
    }
    lines.push(format!("X-Sandstorm-Permissions: {}", identity.permissions));
    if !identity.base_path.is_empty() {
        lines.push(format!("X-Sandstorm-Base-Path: {}", identity.base_path));
        lines.push(format!("Host: {}", host_of_url(&identity.base_path)));
        lines.push(format!("X-Forwarded-Proto: {}", scheme_of_url(&identity.base_path)));
    } else {
        // Dummy value; some API servers (e.g. git-http-backend) fail when
        // Host is absent.
        lines.push("Host: sandbox".to_owned());
    }
    lines.push(format!("X-Sandstorm-Session-Id: {}", identity.session_id));
    if let Some(addr) = &identity.remote_address {
        lines.push(format!("X-Real-IP: {addr}"));
    }

    if !context.cookies.is_empty() {
        let rendered: Vec<String> = context
            .cookies
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        lines.push(format!("Cookie: {}", rendered.join("; ")));
    }

    if context.accept.is_empty() {
        lines.push("Accept: */*".to_owned());
    } else {
        let rendered: Vec<String> = context
            .accept
            .iter()
            .map(|accepted| {
                if accepted.q_value == 1.0 {
                    accepted.mime_type.clone()
                } else {
                    format!("{}; q={}", accepted.mime_type, accepted.q_value)
                }
            })
            .collect();
        lines.push(format!("Accept: {}", rendered.join(", ")));
    }

    for header in &context.additional_headers {
        lines.push(format!("{}: {}", header.name, header.value));
    }

    match &context.etag_precondition {
        ETagPrecondition::None => {}
        ETagPrecondition::Exists => lines.push("If-Match: *".to_owned()),
        ETagPrecondition::DoesntExist => lines.push("If-None-Match: *".to_owned()),
        ETagPrecondition::MatchesOneOf(etags) => {
            lines.push(format!("If-Match: {}", render_etags(etags)));
        }
        ETagPrecondition::MatchesNoneOf(etags) => {
            lines.push(format!("If-None-Match: {}", render_etags(etags)));
        }
    }

    lines.push(String::new());
    lines.push(String::new());
}

fn render_etags(etags: &[gangway_types::ETag]) -> String {
    let rendered: Vec<String> = etags.iter().map(|etag| etag.render()).collect();
    rendered.join(", ")
}

/// `Destination` header for COPY/MOVE, with the control-character guard.
pub fn make_destination_header(
    base_path: &str,
    destination: &str,
) -> Result<String, BridgeError> {
    for byte in destination.bytes() {
        if byte <= b' ' || byte == b',' {
            return Err(BridgeError::protocol(format!(
                "invalid destination: {destination:?}"
            )));
        }
    }
    Ok(format!("Destination: {base_path}{destination}"))
}

/// `Overwrite` header for COPY/MOVE.
pub fn make_overwrite_header(no_overwrite: bool) -> String {
    if no_overwrite { "Overwrite: F".to_owned() } else { "Overwrite: T".to_owned() }
}

/// `Depth` header for the shallow/deep WebDAV verbs.
pub fn make_depth_header(shallow: bool) -> String {
    if shallow { "Depth: 0".to_owned() } else { "Depth: infinity".to_owned() }
}

/// The host component of a base URL, e.g. `grain.example:8000` out of
/// `https://grain.example:8000/`.
fn host_of_url(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    rest.split('/').next().unwrap_or("")
}

/// The scheme component of a base URL.
fn scheme_of_url(url: &str) -> &str {
    match url.find("://") {
        Some(idx) => &url[..idx],
        None => "",
    }
}
