//! # Veneer
//!
//! Blocking HTTP client sessions that present browser network fingerprints.
//!
//! A [`Session`] holds default headers, cookies, auth, proxies, query
//! parameters and an impersonation profile. Each request resolves those
//! defaults against per-call [`RequestOptions`], configures a
//! [`Transport`](transport::Transport) option by option, performs the
//! transfer and rebuilds a [`Response`] from the raw body and header
//! streams. The bundled [`Engine`](transport::Engine) speaks HTTP/1.1 over
//! BoringSSL with Chrome, Edge and Safari TLS fingerprints.

pub mod auth;
pub mod body;
pub mod cookie;
pub mod error;
pub mod headers;
pub mod params;
pub mod request;
pub mod response;
pub mod session;
pub mod timeouts;

pub mod fingerprint;

pub mod transport;

// Re-exports
pub use auth::BasicAuth;
pub use body::Data;
pub use cookie::{Cookie, CookieJar};
pub use error::{Error, Result, TransportError, TransportErrorKind};
pub use fingerprint::BrowserType;
pub use headers::{update_header_line, Headers};
pub use params::{merge_url_params, Params};
pub use request::{PreparedRequest, Proxies, Request, RequestOptions};
pub use response::Response;
pub use session::{Session, SessionBuilder, SessionConfig};
pub use timeouts::Timeout;
