//! `Set-Cookie` parsing.
//!
//! The adapter forwards cookies to the host as structured data, so the
//! attribute grammar is parsed here rather than passed through. Policy:
//! `Secure` is ignored (the host always serves https) and `Domain` is
//! ignored (apps may not publish cookies visible to other hosts).

use chrono::NaiveDateTime;
use gangway_types::{BridgeError, Cookie, CookieExpires};

/// The date formats accepted for the `Expires` attribute, tried in order:
/// RFC 1123, the obsolete two-digit-year form, ANSI C `asctime`, a
/// four-digit-year hyphenated form seen from MediaWiki, and a `-0000` zone
/// variant used by Rack.
const DATE_FORMATS: [&str; 5] = [
    "%a, %d %b %Y %H:%M:%S GMT",
    "%a, %d-%b-%y %H:%M:%S GMT",
    "%a %b %d %H:%M:%S %Y",
    "%a, %d-%b-%Y %H:%M:%S GMT",
    "%a, %d %b %Y %H:%M:%S -0000",
];

/// Parse a cookie expiry date to UTC seconds since the epoch.
///
/// The first format that parses wins; a value matching none of the five is
/// a protocol error.
pub fn parse_cookie_date(value: &str) -> Result<i64, BridgeError> {
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed.and_utc().timestamp());
        }
    }
    Err(BridgeError::protocol(format!(
        "invalid HTTP date from app: {value:?}"
    )))
}

/// Parse one `Set-Cookie` header value into a [`Cookie`].
pub fn parse_set_cookie(value: &str) -> Result<Cookie, BridgeError> {
    let mut cookie = Cookie::default();
    let mut first = true;

    for part in value.split(';') {
        if first {
            first = false;
            let eq = part.find('=').ok_or_else(|| {
                BridgeError::protocol(format!("invalid cookie header from app: {value:?}"))
            })?;
            cookie.name = part[..eq].trim().to_owned();
            cookie.value = part[eq + 1..].trim().to_owned();
        } else if let Some(eq) = part.find('=') {
            let prop = part[..eq].trim().to_ascii_lowercase();
            let attr = part[eq + 1..].trim();
            match prop.as_str() {
                "expires" => {
                    cookie.expires = CookieExpires::Absolute(parse_cookie_date(attr)?);
                }
                "max-age" => {
                    let seconds: u64 = attr.parse().map_err(|_| {
                        BridgeError::protocol(format!("invalid cookie max-age from app: {attr:?}"))
                    })?;
                    cookie.expires = CookieExpires::Relative(seconds);
                }
                "path" => cookie.path = Some(attr.to_owned()),
                // Domain: apps may not publish cookies for other hosts.
                _ => {}
            }
        } else {
            let prop = part.trim().to_ascii_lowercase();
            if prop == "httponly" {
                cookie.http_only = true;
            }
            // Secure: always set by the host, nothing to record.
        }
    }

    Ok(cookie)
}
