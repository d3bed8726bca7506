//! Session: long-lived defaults plus one transport handle.

use crate::auth::BasicAuth;
use crate::cookie::CookieJar;
use crate::error::{Result, TransportError};
use crate::headers::Headers;
use crate::params::Params;
use crate::request::{PreparedRequest, Proxies, RequestOptions};
use crate::response::Response;
use crate::timeouts::Timeout;
use crate::transport::{Engine, Sink, Transport, TransportOption};

/// Defaults applied to every request of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub headers: Headers,
    /// Canonical jar; updated from every response.
    pub cookies: CookieJar,
    pub auth: Option<BasicAuth>,
    pub proxies: Proxies,
    pub params: Params,
    pub verify: bool,
    pub timeout: Timeout,
    /// Accepted for API compatibility; environment proxies are not read.
    pub trust_env: bool,
    /// `-1` is unlimited.
    pub max_redirects: i64,
    /// Impersonation tag, validated on each request.
    pub impersonate: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headers: Headers::new(),
            cookies: CookieJar::new(),
            auth: None,
            proxies: Proxies::new(),
            params: Params::new(),
            verify: true,
            timeout: Timeout::default(),
            trust_env: true,
            max_redirects: -1,
            impersonate: None,
        }
    }
}

/// Builder for [`Session`].
#[derive(Debug, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(mut self, headers: impl Into<Headers>) -> Self {
        self.config.headers = headers.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.append(name, value);
        self
    }

    pub fn cookies(mut self, cookies: impl Into<CookieJar>) -> Self {
        self.config.cookies = cookies.into();
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.cookies.set(name, value);
        self
    }

    pub fn auth(mut self, auth: impl Into<BasicAuth>) -> Self {
        self.config.auth = Some(auth.into());
        self
    }

    pub fn proxies(mut self, proxies: Proxies) -> Self {
        self.config.proxies = proxies;
        self
    }

    pub fn proxy(mut self, scheme: impl Into<String>, url: impl Into<String>) -> Self {
        self.config.proxies.insert(scheme.into(), url.into());
        self
    }

    pub fn params(mut self, params: impl Into<Params>) -> Self {
        self.config.params = params.into();
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.params.insert(key, value);
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.config.verify = verify;
        self
    }

    pub fn timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.config.timeout = timeout.into();
        self
    }

    pub fn trust_env(mut self, trust_env: bool) -> Self {
        self.config.trust_env = trust_env;
        self
    }

    pub fn max_redirects(mut self, max: i64) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Impersonation tag such as `"chrome101"` or a [`BrowserType`](crate::BrowserType).
    pub fn impersonate(mut self, tag: impl Into<String>) -> Self {
        self.config.impersonate = Some(tag.into());
        self
    }

    /// Build a session over the bundled engine.
    pub fn build(self) -> Session<Engine> {
        self.build_with(Engine::new())
    }

    /// Build a session over a caller-supplied transport.
    pub fn build_with<T: Transport>(self, transport: T) -> Session<T> {
        Session {
            transport,
            config: self.config,
            closed: false,
        }
    }
}

/// An HTTP session.
///
/// Holds the defaults every request starts from and exclusively owns one
/// transport handle, which is released on [`close`](Session::close) or
/// when the session is dropped. A session runs one request at a time;
/// share it across threads only behind a lock.
///
/// ```no_run
/// use veneer::{RequestOptions, Session};
///
/// let mut session = Session::builder().impersonate("chrome101").build();
/// let response = session.get("https://example.com/", RequestOptions::new().param("q", "a b"))?;
/// println!("{} {}", response.status_code, response.text());
/// # Ok::<(), veneer::Error>(())
/// ```
#[derive(Debug)]
pub struct Session<T: Transport = Engine> {
    transport: T,
    config: SessionConfig,
    closed: bool,
}

impl Session<Engine> {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Session with default settings over the bundled engine.
    pub fn new() -> Self {
        SessionBuilder::new().build()
    }
}

impl Default for Session<Engine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Session<T> {
    /// Session with default settings over `transport`.
    pub fn with_transport(transport: T) -> Self {
        SessionBuilder::new().build_with(transport)
    }

    /// Send a request and reconstruct its response.
    ///
    /// The request is fully resolved before the transport is touched, so
    /// configuration errors leave the transport as it was. Cookies set by
    /// the final response are stored in the session jar.
    pub fn request(&mut self, method: &str, url: &str, opts: RequestOptions) -> Result<Response> {
        if self.closed {
            return Err(TransportError::closed().into());
        }

        let prepared = PreparedRequest::prepare(method, url, &self.config, opts)?;
        tracing::debug!(
            "{} {} (impersonate: {})",
            prepared.request.method,
            prepared.request.url,
            prepared.impersonate.map(|b| b.as_str()).unwrap_or("none")
        );

        let body = Sink::new();
        let raw_headers = Sink::new();

        self.transport.reset();
        for option in prepared.transport_options() {
            self.transport.set_option(option)?;
        }
        self.transport.set_option(TransportOption::WriteSink(body.clone()))?;
        self.transport.set_option(TransportOption::HeaderSink(raw_headers.clone()))?;

        self.transport.perform()?;

        let info = self.transport.info();
        let transport = &self.transport;
        let response = Response::reconstruct(
            prepared.request,
            body.take(),
            &raw_headers.take(),
            info,
            |line| transport.reason_phrase(line),
        );

        self.config.cookies.extract_cookies(&response);

        tracing::debug!(
            "{} {} -> {} in {:?} ({} redirects)",
            response.request.method,
            response.url,
            response.status_code,
            response.elapsed,
            response.redirect_count
        );
        Ok(response)
    }

    pub fn head(&mut self, url: &str, opts: RequestOptions) -> Result<Response> {
        self.request("HEAD", url, opts)
    }

    pub fn get(&mut self, url: &str, opts: RequestOptions) -> Result<Response> {
        self.request("GET", url, opts)
    }

    pub fn post(&mut self, url: &str, opts: RequestOptions) -> Result<Response> {
        self.request("POST", url, opts)
    }

    pub fn put(&mut self, url: &str, opts: RequestOptions) -> Result<Response> {
        self.request("PUT", url, opts)
    }

    pub fn patch(&mut self, url: &str, opts: RequestOptions) -> Result<Response> {
        self.request("PATCH", url, opts)
    }

    pub fn delete(&mut self, url: &str, opts: RequestOptions) -> Result<Response> {
        self.request("DELETE", url, opts)
    }

    pub fn options(&mut self, url: &str, opts: RequestOptions) -> Result<Response> {
        self.request("OPTIONS", url, opts)
    }

    /// Release the transport. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.transport.close();
        self.closed = true;
        tracing::debug!("Session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.config.headers
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.config.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.config.cookies
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.close();
    }
}
