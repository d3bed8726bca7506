//! RFC 7617 Basic Authentication.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Username/password pair for transport-level basic credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `Authorization` header value for these credentials.
    pub fn header_value(&self) -> String {
        basic_auth(&self.username, &self.password)
    }
}

impl<U: Into<String>, P: Into<String>> From<(U, P)> for BasicAuth {
    fn from((username, password): (U, P)) -> Self {
        Self::new(username, password)
    }
}

/// Generate Basic Auth header value (RFC 7617).
///
/// # Returns
/// "Basic " followed by base64-encoded credentials.
pub fn basic_auth(username: &str, password: &str) -> String {
    let plain = format!("{}:{}", username, password);
    format!("Basic {}", BASE64.encode(plain))
}

/// Parse a Basic Auth header value.
///
/// Returns (username, password) or None if invalid.
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?.trim();
    let decoded_vec = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded_vec).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
