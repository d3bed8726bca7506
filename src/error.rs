//! Error types for veneer crate.

use std::fmt;
use std::io;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`Session::request`](crate::Session::request) and the
/// types it composes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request body argument is not a mapping, byte stream or bytes.
    #[error("Invalid body type: {0}")]
    InvalidBodyType(String),

    /// Feature intentionally left out (multipart file uploads).
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// HTTPS proxy value uses the `https://` prefix.
    #[error("Bad proxy scheme: {0}")]
    ProxyBadScheme(String),

    /// Impersonation tag outside the supported browser set.
    #[error("Impersonation {0:?} is not supported")]
    UnsupportedImpersonation(String),

    /// Any failure inside the transport (DNS, TLS, timeout, protocol).
    #[error("Request failed: {0}")]
    Transport(#[from] TransportError),

    /// Non-success status, raised only by `Response::raise_for_status`.
    #[error("HTTP {status}: {reason}")]
    HttpStatus { status: u16, reason: String },

    /// Cookie parsing error.
    #[error("Cookie parse error: {0}")]
    CookieParse(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (reading a streamed request body).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an HTTP status error.
    pub fn http_status(status: u16, reason: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            reason: reason.into(),
        }
    }

    /// Create an invalid body type error.
    pub fn invalid_body(message: impl Into<String>) -> Self {
        Self::InvalidBodyType(message.into())
    }

    /// Transport failure kind, if this is a transport error.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport(e) => Some(e.kind()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.transport_kind() == Some(TransportErrorKind::Timeout)
    }
}

/// Category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Host name resolution failed.
    Dns,
    /// TCP connection could not be established.
    Connect,
    /// TLS handshake or configuration failure.
    Tls,
    /// Connect or total deadline exceeded.
    Timeout,
    /// Proxy refused, misconfigured or unsupported.
    Proxy,
    /// Malformed or unexpected HTTP exchange.
    Protocol,
    /// Redirect limit exceeded.
    TooManyRedirects,
    /// Socket read/write failure.
    Io,
    /// Handle used after `close()`.
    Closed,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dns => "DNS error",
            Self::Connect => "Connection error",
            Self::Tls => "TLS error",
            Self::Timeout => "Timeout",
            Self::Proxy => "Proxy error",
            Self::Protocol => "HTTP protocol error",
            Self::TooManyRedirects => "Too many redirects",
            Self::Io => "IO error",
            Self::Closed => "Handle closed",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Protocol, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn tls(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Tls, message)
    }

    pub fn proxy(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Proxy, message)
    }

    pub fn closed() -> Self {
        Self::new(TransportErrorKind::Closed, "transport handle is closed")
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::timeout(e.to_string()),
            io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                Self::new(TransportErrorKind::Connect, e.to_string())
            }
            _ => Self::new(TransportErrorKind::Io, e.to_string()),
        }
    }
}
