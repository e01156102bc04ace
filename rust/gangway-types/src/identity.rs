//! Session identity: who the user is and how the session addresses the app.

use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// Pronouns declared in the user's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pronouns {
    #[default]
    Neutral,
    Male,
    Female,
    Robot,
}

impl Pronouns {
    /// The enumerant name as sent in `X-Sandstorm-User-Pronouns`.
    pub fn name(self) -> &'static str {
        match self {
            Pronouns::Neutral => "neutral",
            Pronouns::Male => "male",
            Pronouns::Female => "female",
            Pronouns::Robot => "robot",
        }
    }
}

/// User information delivered by the host when a session is opened.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserInfo {
    pub display_name: String,
    pub preferred_handle: String,
    pub picture_url: String,
    pub pronouns: Pronouns,
    /// 32-byte identity digest; empty for anonymous users.
    pub identity_id: Vec<u8>,
    /// One bit per permission declared in the package's view info.
    pub permissions: Vec<bool>,
}

/// Immutable per-session identity, fixed at session construction.
///
/// Everything here ends up in request headers, so string fields are stored
/// pre-rendered: the display name percent-encoded, the tab id hex-encoded,
/// permissions and accept-languages already joined.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    /// Monotonically assigned identifier, rendered as a decimal string.
    pub session_id: String,
    /// Hex encoding of the opaque tab id supplied by the host.
    pub tab_id: String,
    /// Percent-encoded display name.
    pub user_display_name: String,
    /// Hex of the first 16 bytes of the identity digest, when logged in.
    pub user_id: Option<String>,
    pub user_handle: String,
    pub user_picture: String,
    pub user_pronouns: Pronouns,
    /// Comma-joined granted permission names.
    pub permissions: String,
    /// Base URL of the session; empty for API sessions.
    pub base_path: String,
    pub user_agent: String,
    /// Comma-joined accept-language list.
    pub accept_languages: String,
    /// URL path prefix: "/" for web sessions, the configured API prefix
    /// for API sessions.
    pub root_path: String,
    pub remote_address: Option<String>,
}

impl SessionIdentity {
    /// Derive the user id header value from an identity digest.
    ///
    /// The digest must be 32 bytes; the header carries the hex of the first
    /// 16 to stay wieldy while remaining 128 bits of identity.
    pub fn user_id_from_digest(identity_id: &[u8]) -> Result<Option<String>, BridgeError> {
        if identity_id.is_empty() {
            return Ok(None);
        }
        if identity_id.len() != 32 {
            return Err(BridgeError::protocol(format!(
                "identity id is {} bytes, expected a 32-byte digest",
                identity_id.len()
            )));
        }
        Ok(Some(hex_encode(&identity_id[..16])))
    }
}

/// Lower-case hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(char::from_digit((b >> 4) as u32, 16).unwrap());
        out.push(char::from_digit((b & 0xf) as u32, 16).unwrap());
    }
    out
}

/// Percent-encode a display name for transport in a header.
///
/// Unreserved characters (RFC 3986) pass through; everything else becomes
/// `%XX` with lower-case hex.
pub fn percent_encode(text: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(text.len());
    for &b in text.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => {
                out.push('%');
                out.push(HEX[(b >> 4) as usize] as char);
                out.push(HEX[(b & 0xf) as usize] as char);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encoding_leaves_unreserved_alone() {
        assert_eq!(percent_encode("Alice_a-z.0~9"), "Alice_a-z.0~9");
        assert_eq!(percent_encode("Alice Dev"), "Alice%20Dev");
        assert_eq!(percent_encode("naïve"), "na%c3%afve");
    }

    #[test]
    fn user_id_is_hex_of_first_half_of_digest() {
        let digest: Vec<u8> = (0u8..32).collect();
        let id = SessionIdentity::user_id_from_digest(&digest).unwrap().unwrap();
        assert_eq!(id, "000102030405060708090a0b0c0d0e0f");
        assert_eq!(id.len(), 32);
    }

    #[test]
    fn anonymous_user_has_no_id() {
        assert!(SessionIdentity::user_id_from_digest(&[]).unwrap().is_none());
    }

    #[test]
    fn short_digest_is_rejected() {
        assert!(SessionIdentity::user_id_from_digest(&[1, 2, 3]).is_err());
    }
}
