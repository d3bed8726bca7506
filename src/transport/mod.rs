//! Transport seam and the bundled engine.
//!
//! A [`Transport`] is a stateful handle configured one option at a time and
//! then performed, in the manner of a libcurl easy handle. The session layer
//! only ever talks to this trait; [`Engine`] is the implementation shipped
//! with the crate.

pub mod connector;
pub mod decode;
pub mod engine;
pub mod h1;

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;

use crate::error::TransportError;
use crate::fingerprint::BrowserType;

pub use engine::Engine;

/// One configuration knob of a transport handle.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOption {
    /// Request method, sent verbatim.
    Method(String),
    Url(String),
    /// Request body.
    Body(Bytes),
    /// Explicit body length; bodies may contain NUL bytes.
    BodyLength(u64),
    /// Ordered `Name: value` header lines.
    HttpHeader(Vec<String>),
    BasicAuth { username: String, password: String },
    ConnectTimeoutMs(u64),
    /// Bound on the whole transfer, redirects included.
    TimeoutMs(u64),
    FollowLocation(bool),
    /// Maximum redirects to follow; `-1` is unlimited.
    MaxRedirects(i64),
    Proxy(String),
    /// Tunnel through the proxy with `CONNECT`.
    HttpProxyTunnel(bool),
    SslVerifyPeer(bool),
    SslVerifyHost(bool),
    Referer(String),
    /// Advertised encodings; empty means every encoding the transport decodes.
    AcceptEncoding(String),
    Impersonate(BrowserType),
    /// Receives the decoded response body.
    WriteSink(Sink),
    /// Receives the raw status line and headers of every hop.
    HeaderSink(Sink),
}

/// Transfer metadata available after `perform`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferInfo {
    /// URL of the last hop.
    pub effective_url: String,
    pub response_code: u16,
    pub total_time: Duration,
    pub redirect_count: u32,
    /// Location the transport would have followed next. Empty when there
    /// was no unfollowed redirect.
    pub redirect_url: String,
}

/// A configurable, performable HTTP transfer handle.
///
/// Handles are used by one request at a time: `reset`, a series of
/// `set_option` calls, `perform`, then `info`.
pub trait Transport {
    /// Forget every option set for the previous transfer.
    fn reset(&mut self);

    fn set_option(&mut self, option: TransportOption) -> Result<(), TransportError>;

    /// Run the configured transfer to completion.
    fn perform(&mut self) -> Result<(), TransportError>;

    fn info(&self) -> TransferInfo;

    /// Reason text of a raw status line such as `HTTP/1.1 404 Not Found`.
    fn reason_phrase(&self, status_line: &[u8]) -> String {
        parse_reason_phrase(status_line)
    }

    /// Release the handle. Calling it again is a no-op.
    fn close(&mut self);
}

/// Extract the reason phrase from a status line.
///
/// HTTP/2 status lines carry no reason, so the canonical phrase for the
/// code is used when the line has none.
pub fn parse_reason_phrase(status_line: &[u8]) -> String {
    let line = String::from_utf8_lossy(status_line);
    let line = line.trim_end_matches(&['\r', '\n'][..]);

    let mut parts = line.splitn(3, ' ');
    let _version = parts.next();
    let code = parts.next().unwrap_or("");
    let reason = parts.next().map(str::trim).unwrap_or("");

    if !reason.is_empty() {
        return reason.to_string();
    }
    code.parse::<u16>()
        .ok()
        .and_then(|c| http::StatusCode::from_u16(c).ok())
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
        .to_string()
}

/// Shared append-only byte buffer handed to a transport as a write target.
///
/// Clones share the same buffer, so the session keeps one clone and gives
/// the other to the transport.
#[derive(Clone, Default)]
pub struct Sink(Arc<Mutex<Vec<u8>>>);

impl Sink {
    pub fn new() -> Self {
        Self::default()
    }

    fn buf(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf())
    }

    /// Take everything written so far, leaving the buffer empty.
    pub fn take(&self) -> Bytes {
        Bytes::from(std::mem::take(&mut *self.buf()))
    }

    pub fn len(&self) -> usize {
        self.buf().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Write for Sink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl PartialEq for Sink {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink").field("len", &self.len()).finish()
    }
}
