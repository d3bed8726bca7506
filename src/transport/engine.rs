//! Bundled blocking transport: HTTP/1.1 over TCP or BoringSSL.

use std::io::Write;
use std::time::{Duration, Instant};

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::auth::basic_auth;
use crate::error::{TransportError, TransportErrorKind};
use crate::fingerprint::BrowserType;
use crate::transport::connector::{connect_tcp, MaybeTlsStream, TlsConnector};
use crate::transport::decode::{decode_body, SUPPORTED_ENCODINGS};
use crate::transport::h1::{H1Connection, RawResponse};
use crate::transport::{Sink, TransferInfo, Transport, TransportOption};

/// Options of the transfer being configured.
#[derive(Debug, Clone)]
struct EngineOptions {
    method: Option<String>,
    url: Option<String>,
    body: Bytes,
    body_length: Option<u64>,
    header_lines: Vec<String>,
    auth: Option<(String, String)>,
    connect_timeout_ms: Option<u64>,
    timeout_ms: Option<u64>,
    follow_location: bool,
    max_redirects: i64,
    proxy: Option<String>,
    proxy_tunnel: bool,
    verify_peer: bool,
    verify_host: bool,
    referer: Option<String>,
    accept_encoding: Option<String>,
    impersonate: Option<BrowserType>,
    write_sink: Option<Sink>,
    header_sink: Option<Sink>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            method: None,
            url: None,
            body: Bytes::new(),
            body_length: None,
            header_lines: Vec::new(),
            auth: None,
            connect_timeout_ms: None,
            timeout_ms: None,
            follow_location: false,
            max_redirects: -1,
            proxy: None,
            proxy_tunnel: false,
            verify_peer: true,
            verify_host: true,
            referer: None,
            accept_encoding: None,
            impersonate: None,
            write_sink: None,
            header_sink: None,
        }
    }
}

/// Proxy endpoint parsed from the proxy option.
struct ProxyTarget {
    host: String,
    port: u16,
    authorization: Option<String>,
}

/// Blocking HTTP/1.1 transport with browser TLS fingerprints.
///
/// Each hop of a transfer opens a fresh connection; nothing is pooled.
#[derive(Debug, Default)]
pub struct Engine {
    options: EngineOptions,
    info: TransferInfo,
    closed: bool,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    fn remaining(deadline: Option<Instant>) -> Result<Option<Duration>, TransportError> {
        match deadline {
            None => Ok(None),
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(TransportError::timeout("operation timed out"))
                } else {
                    Ok(Some(left))
                }
            }
        }
    }

    fn proxy_target(&self) -> Result<Option<ProxyTarget>, TransportError> {
        let Some(raw) = self.options.proxy.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{}", raw)
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| TransportError::proxy(format!("invalid proxy {}: {}", raw, e)))?;
        if url.scheme() != "http" {
            return Err(TransportError::proxy(format!(
                "proxy scheme {:?} is not supported by the bundled engine",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::proxy(format!("proxy {} has no host", raw)))?
            .to_string();
        let authorization = if url.username().is_empty() {
            None
        } else {
            let username = percent_decode(url.username());
            let password = percent_decode(url.password().unwrap_or(""));
            Some(basic_auth(&username, &password))
        };
        Ok(Some(ProxyTarget {
            host,
            port: url.port().unwrap_or(1080),
            authorization,
        }))
    }

    /// Request headers for one hop: profile defaults first, then the
    /// engine-managed headers, then the caller's lines, each replacing by name.
    fn request_headers(&self, send_auth: bool) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .options
            .impersonate
            .map(|b| {
                b.default_headers()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        match &self.options.accept_encoding {
            Some(enc) if enc.is_empty() => set_header(&mut headers, "Accept-Encoding", SUPPORTED_ENCODINGS),
            Some(enc) => set_header(&mut headers, "Accept-Encoding", enc),
            None => remove_header(&mut headers, "Accept-Encoding"),
        }
        if let Some(referer) = &self.options.referer {
            set_header(&mut headers, "Referer", referer);
        }
        if send_auth {
            if let Some((username, password)) = &self.options.auth {
                set_header(&mut headers, "Authorization", &basic_auth(username, password));
            }
        }

        for line in &self.options.header_lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let (name, value) = (name.trim(), value.trim());
            if value.is_empty() {
                remove_header(&mut headers, name);
            } else {
                set_header(&mut headers, name, value);
            }
        }
        headers
    }

    fn open_stream(&self, url: &Url, deadline: Option<Instant>) -> Result<(MaybeTlsStream, bool), TransportError> {
        let https = url.scheme() == "https";
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::protocol(format!("URL {} has no host", url)))?;
        let port = url.port_or_known_default().unwrap_or(if https { 443 } else { 80 });

        let connect_timeout = match (self.options.connect_timeout_ms, Self::remaining(deadline)?) {
            (Some(ms), Some(left)) if ms > 0 => Some(left.min(Duration::from_millis(ms))),
            (Some(ms), None) if ms > 0 => Some(Duration::from_millis(ms)),
            (_, left) => left,
        };

        let proxy = self.proxy_target()?;
        let (tcp, absolute_form) = match &proxy {
            None => (connect_tcp(host, port, connect_timeout)?, false),
            Some(proxy) => {
                let tcp = connect_tcp(&proxy.host, proxy.port, connect_timeout)
                    .map_err(|e| TransportError::proxy(e.message()))?;
                if https || self.options.proxy_tunnel {
                    let tcp = establish_tunnel(tcp, host, port, proxy.authorization.as_deref(), deadline)?;
                    (tcp, false)
                } else {
                    (tcp, true)
                }
            }
        };

        let stream = if https {
            let connector = TlsConnector::new(self.options.impersonate.map(|b| b.tls_fingerprint()))
                .verify_peer(self.options.verify_peer)
                .verify_host(self.options.verify_host);
            let left = Self::remaining(deadline)?;
            tcp.set_read_timeout(left)?;
            tcp.set_write_timeout(left)?;
            MaybeTlsStream::Tls(Box::new(connector.connect(host, tcp)?))
        } else {
            MaybeTlsStream::Plain(tcp)
        };
        stream.set_io_timeout(Self::remaining(deadline)?)?;

        Ok((stream, absolute_form))
    }

    fn send_hop(
        &self,
        method: &str,
        url: &Url,
        body: &[u8],
        send_auth: bool,
        deadline: Option<Instant>,
    ) -> Result<RawResponse, TransportError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::protocol(format!(
                "unsupported URL scheme {:?}",
                url.scheme()
            )));
        }

        let (stream, absolute_form) = self.open_stream(url, deadline)?;
        let host = host_header(url);

        let mut headers = self.request_headers(send_auth);
        let target = if absolute_form {
            if let Some(auth) = self.proxy_target()?.and_then(|p| p.authorization) {
                set_header(&mut headers, "Proxy-Authorization", &auth);
            }
            absolute_target(url)
        } else {
            origin_target(url)
        };

        tracing::debug!("{} {} via {}", method, url, if stream.is_tls() { "TLS" } else { "TCP" });
        let mut conn = H1Connection::new(stream).with_deadline(deadline);
        conn.send_request(method, &target, &host, &headers, body)
    }
}

impl Transport for Engine {
    fn reset(&mut self) {
        self.options = EngineOptions::default();
        self.info = TransferInfo::default();
    }

    fn set_option(&mut self, option: TransportOption) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::closed());
        }
        let o = &mut self.options;
        match option {
            TransportOption::Method(m) => o.method = Some(m),
            TransportOption::Url(u) => o.url = Some(u),
            TransportOption::Body(b) => o.body = b,
            TransportOption::BodyLength(n) => o.body_length = Some(n),
            TransportOption::HttpHeader(lines) => o.header_lines = lines,
            TransportOption::BasicAuth { username, password } => o.auth = Some((username, password)),
            TransportOption::ConnectTimeoutMs(ms) => o.connect_timeout_ms = Some(ms),
            TransportOption::TimeoutMs(ms) => o.timeout_ms = Some(ms),
            TransportOption::FollowLocation(follow) => o.follow_location = follow,
            TransportOption::MaxRedirects(max) => o.max_redirects = max,
            TransportOption::Proxy(p) => o.proxy = Some(p),
            TransportOption::HttpProxyTunnel(tunnel) => o.proxy_tunnel = tunnel,
            TransportOption::SslVerifyPeer(v) => o.verify_peer = v,
            TransportOption::SslVerifyHost(v) => o.verify_host = v,
            TransportOption::Referer(r) => o.referer = Some(r),
            TransportOption::AcceptEncoding(e) => o.accept_encoding = Some(e),
            TransportOption::Impersonate(b) => o.impersonate = Some(b),
            TransportOption::WriteSink(s) => o.write_sink = Some(s),
            TransportOption::HeaderSink(s) => o.header_sink = Some(s),
        }
        Ok(())
    }

    fn perform(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::closed());
        }
        let raw_url = self
            .options
            .url
            .clone()
            .ok_or_else(|| TransportError::protocol("no URL set"))?;
        let mut url = Url::parse(&raw_url)
            .map_err(|e| TransportError::protocol(format!("invalid URL {}: {}", raw_url, e)))?;

        let start = Instant::now();
        let deadline = self
            .options
            .timeout_ms
            .filter(|&ms| ms > 0)
            .map(|ms| start + Duration::from_millis(ms));

        let mut body = self.options.body.clone();
        if let Some(len) = self.options.body_length {
            body.truncate(usize::try_from(len).unwrap_or(usize::MAX));
        }
        let mut method = self
            .options
            .method
            .clone()
            .unwrap_or_else(|| String::from(if body.is_empty() { "GET" } else { "POST" }));

        let origin = url.host_str().map(str::to_owned);
        self.info = TransferInfo::default();
        let mut redirects: u32 = 0;

        loop {
            let send_auth = url.host_str().map(str::to_owned) == origin;
            let hop = self.send_hop(&method, &url, &body, send_auth, deadline)?;

            if let Some(sink) = &mut self.options.header_sink {
                sink.write_all(&hop.head)?;
            }
            self.info.response_code = hop.status;
            self.info.effective_url = url.to_string();
            self.info.total_time = start.elapsed();

            let next = match hop.header("location").filter(|_| is_redirect(hop.status)) {
                Some(location) => Some(url.join(location).map_err(|e| {
                    TransportError::protocol(format!("invalid redirect location {:?}: {}", location, e))
                })?),
                None => None,
            };

            if let Some(next) = next {
                if !self.options.follow_location {
                    self.info.redirect_url = next.to_string();
                } else if self.options.max_redirects >= 0 && i64::from(redirects) >= self.options.max_redirects {
                    return Err(TransportError::new(
                        TransportErrorKind::TooManyRedirects,
                        format!("maximum ({}) redirects followed", self.options.max_redirects),
                    ));
                } else {
                    redirects += 1;
                    self.info.redirect_count = redirects;
                    let to_get = (hop.status == 303 && !method.eq_ignore_ascii_case("HEAD"))
                        || (matches!(hop.status, 301 | 302) && method.eq_ignore_ascii_case("POST"));
                    if to_get {
                        method = "GET".to_string();
                        body = Bytes::new();
                    }
                    tracing::debug!("Redirect {} -> {} ({})", url, next, hop.status);
                    url = next;
                    continue;
                }
            }

            let mut content = hop.body.clone();
            if self.options.accept_encoding.is_some() {
                if let Some(encoding) = hop.header("content-encoding") {
                    content = decode_body(encoding, content)?;
                }
            }
            if let Some(sink) = &mut self.options.write_sink {
                sink.write_all(&content)?;
            }

            self.info.total_time = start.elapsed();
            return Ok(());
        }
    }

    fn info(&self) -> TransferInfo {
        self.info.clone()
    }

    fn close(&mut self) {
        if !self.closed {
            self.options = EngineOptions::default();
            self.closed = true;
        }
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Send `CONNECT host:port` and wait for a 2xx.
fn establish_tunnel(
    tcp: std::net::TcpStream,
    host: &str,
    port: u16,
    authorization: Option<&str>,
    deadline: Option<Instant>,
) -> Result<std::net::TcpStream, TransportError> {
    let authority = format!("{}:{}", host, port);
    let mut headers = Vec::new();
    if let Some(auth) = authorization {
        headers.push(("Proxy-Authorization".to_string(), auth.to_string()));
    }

    let mut conn = H1Connection::new(tcp).with_deadline(deadline);
    let response = conn.send_request("CONNECT", &authority, &authority, &headers, b"")?;
    if !(200..300).contains(&response.status) {
        return Err(TransportError::proxy(format!(
            "CONNECT {} refused with status {}",
            authority, response.status
        )));
    }
    Ok(conn.into_inner())
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(name)) {
        Some(idx) => headers[idx] = (name.to_string(), value.to_string()),
        None => headers.push((name.to_string(), value.to_string())),
    }
}

fn remove_header(headers: &mut Vec<(String, String)>, name: &str) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn origin_target(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn absolute_target(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}
