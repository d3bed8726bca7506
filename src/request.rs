//! Per-call request options and their translation into transport options.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::Value;

use crate::auth::BasicAuth;
use crate::body::{resolve_body, Data};
use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::fingerprint::BrowserType;
use crate::headers::{update_header_line, Headers};
use crate::params::{merge_url_params, Params};
use crate::session::SessionConfig;
use crate::timeouts::Timeout;
use crate::transport::TransportOption;

/// Proxy URL per target scheme (`"http"`, `"https"`).
pub type Proxies = BTreeMap<String, String>;

const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br";

/// Per-call overrides of the session defaults.
///
/// ```
/// use veneer::RequestOptions;
///
/// let opts = RequestOptions::new()
///     .param("q", "rust")
///     .header("Accept", "application/json")
///     .timeout((2.0, 5.0))
///     .allow_redirects(false);
/// ```
#[derive(Debug)]
pub struct RequestOptions {
    params: Option<Params>,
    data: Option<Data>,
    json: Option<Value>,
    headers: Option<Headers>,
    cookies: Option<CookieJar>,
    files: Vec<(String, Bytes)>,
    auth: Option<BasicAuth>,
    timeout: Option<Timeout>,
    allow_redirects: bool,
    max_redirects: Option<i64>,
    proxies: Option<Proxies>,
    verify: Option<bool>,
    referer: Option<String>,
    accept_encoding: Option<String>,
    impersonate: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            params: None,
            data: None,
            json: None,
            headers: None,
            cookies: None,
            files: Vec::new(),
            auth: None,
            timeout: None,
            allow_redirects: true,
            max_redirects: None,
            proxies: None,
            verify: None,
            referer: None,
            accept_encoding: Some(DEFAULT_ACCEPT_ENCODING.to_string()),
            impersonate: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: impl Into<Params>) -> Self {
        self.params = Some(params.into());
        self
    }

    /// Add one query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.get_or_insert_with(Params::new).insert(key, value);
        self
    }

    pub fn data(mut self, data: impl Into<Data>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Form-url-encoded body.
    pub fn form<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.data(Data::form(pairs))
    }

    /// JSON body. Takes precedence over `data`.
    pub fn json(mut self, json: impl Into<Value>) -> Self {
        self.json = Some(json.into());
        self
    }

    pub fn headers(mut self, headers: impl Into<Headers>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Headers::new).append(name, value);
        self
    }

    pub fn cookies(mut self, cookies: impl Into<CookieJar>) -> Self {
        self.cookies = Some(cookies.into());
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.get_or_insert_with(CookieJar::new).set(name, value);
        self
    }

    /// Attach a file upload. Uploads are not supported and make the request
    /// fail with [`Error::NotImplemented`].
    pub fn file(mut self, field: impl Into<String>, content: impl Into<Bytes>) -> Self {
        self.files.push((field.into(), content.into()));
        self
    }

    pub fn auth(mut self, auth: impl Into<BasicAuth>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    pub fn timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }

    pub fn max_redirects(mut self, max: i64) -> Self {
        self.max_redirects = Some(max);
        self
    }

    pub fn proxies(mut self, proxies: Proxies) -> Self {
        self.proxies = Some(proxies);
        self
    }

    pub fn proxy(mut self, scheme: impl Into<String>, url: impl Into<String>) -> Self {
        self.proxies
            .get_or_insert_with(Proxies::new)
            .insert(scheme.into(), url.into());
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn accept_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.accept_encoding = Some(encoding.into());
        self
    }

    /// Do not advertise or decode any content encoding.
    pub fn no_accept_encoding(mut self) -> Self {
        self.accept_encoding = None;
        self
    }

    /// Impersonation tag, validated when the request is prepared.
    pub fn impersonate(mut self, tag: impl Into<String>) -> Self {
        self.impersonate = Some(tag.into());
        self
    }
}

/// The request as seen by the cookie jar and kept on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: Headers,
}

/// Proxy chosen for the target URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySetting {
    pub url: String,
    /// Tunnel with `CONNECT` (HTTPS targets behind a non-SOCKS proxy).
    pub tunnel: bool,
}

/// Fully resolved request, ready to be handed to a transport.
///
/// Preparing does no I/O and never touches a transport, so every
/// configuration error surfaces before the transport is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub request: Request,
    pub body: Bytes,
    pub header_lines: Vec<String>,
    pub auth: Option<BasicAuth>,
    pub timeout: Timeout,
    pub allow_redirects: bool,
    pub max_redirects: i64,
    pub proxy: Option<ProxySetting>,
    pub verify: bool,
    pub referer: Option<String>,
    pub accept_encoding: Option<String>,
    pub impersonate: Option<BrowserType>,
}

impl PreparedRequest {
    /// Resolve `opts` against the session defaults.
    ///
    /// Per-call values win over session values field by field.
    pub fn prepare(method: &str, url: &str, config: &SessionConfig, opts: RequestOptions) -> Result<Self> {
        let method = method.to_ascii_uppercase();

        let mut url = merge_url_params(url, &config.params);
        if let Some(params) = &opts.params {
            url = merge_url_params(&url, params);
        }

        let body = resolve_body(opts.data, opts.json.as_ref())?;

        let mut headers = config.headers.clone();
        if let Some(extra) = &opts.headers {
            headers.update(extra);
        }

        let mut cookies = config.cookies.clone();
        if let Some(extra) = &opts.cookies {
            cookies.update(extra);
        }
        let mut request = Request { method, url, headers };
        cookies.set_cookie_header(&mut request);

        let mut header_lines = request.headers.to_lines();
        if let Some(content_type) = body.content_type {
            update_header_line(&mut header_lines, "Content-Type", content_type);
        }

        if !opts.files.is_empty() {
            return Err(Error::NotImplemented("file uploads are not supported".into()));
        }

        let auth = opts.auth.or_else(|| config.auth.clone());
        let timeout = opts.timeout.unwrap_or(config.timeout);
        let max_redirects = opts.max_redirects.unwrap_or(config.max_redirects);

        let mut proxies = config.proxies.clone();
        if let Some(extra) = opts.proxies {
            proxies.extend(extra);
        }
        let proxy = select_proxy(&request.url, &proxies)?;

        let verify = opts.verify.unwrap_or(config.verify);

        let impersonate = match opts.impersonate.as_deref().or(config.impersonate.as_deref()) {
            Some(tag) => Some(tag.parse::<BrowserType>()?),
            None => None,
        };

        Ok(Self {
            request,
            body: body.bytes,
            header_lines,
            auth,
            timeout,
            allow_redirects: opts.allow_redirects,
            max_redirects,
            proxy,
            verify,
            referer: opts.referer.filter(|r| !r.is_empty()),
            accept_encoding: opts.accept_encoding,
            impersonate,
        })
    }

    /// Options to apply to a freshly reset transport, in order.
    ///
    /// The write and header sinks are not included; the session owns them.
    pub fn transport_options(&self) -> Vec<TransportOption> {
        let mut options = vec![
            TransportOption::Method(self.request.method.clone()),
            TransportOption::Url(self.request.url.clone()),
        ];

        if !self.body.is_empty() {
            options.push(TransportOption::Body(self.body.clone()));
            options.push(TransportOption::BodyLength(self.body.len() as u64));
        }

        options.push(TransportOption::HttpHeader(self.header_lines.clone()));

        if let Some(auth) = &self.auth {
            options.push(TransportOption::BasicAuth {
                username: auth.username.clone(),
                password: auth.password.clone(),
            });
        }

        if let Some(connect) = self.timeout.connect_ms() {
            options.push(TransportOption::ConnectTimeoutMs(connect));
        }
        options.push(TransportOption::TimeoutMs(self.timeout.total_ms()));

        options.push(TransportOption::FollowLocation(self.allow_redirects));
        options.push(TransportOption::MaxRedirects(self.max_redirects));

        if let Some(proxy) = &self.proxy {
            options.push(TransportOption::Proxy(proxy.url.clone()));
            if proxy.tunnel {
                options.push(TransportOption::HttpProxyTunnel(true));
            }
        }

        if !self.verify {
            options.push(TransportOption::SslVerifyPeer(false));
            options.push(TransportOption::SslVerifyHost(false));
        }

        if let Some(referer) = &self.referer {
            options.push(TransportOption::Referer(referer.clone()));
        }
        if let Some(encoding) = &self.accept_encoding {
            options.push(TransportOption::AcceptEncoding(encoding.clone()));
        }
        if let Some(browser) = self.impersonate {
            options.push(TransportOption::Impersonate(browser));
        }

        options
    }
}

/// Pick the proxy for `url` by its scheme prefix.
///
/// A scheme with no configured entry means a direct connection.
fn select_proxy(url: &str, proxies: &Proxies) -> Result<Option<ProxySetting>> {
    if proxies.is_empty() {
        return Ok(None);
    }

    if url.starts_with("http://") {
        return Ok(proxies.get("http").map(|p| ProxySetting {
            url: p.clone(),
            tunnel: false,
        }));
    }

    if url.starts_with("https://") {
        let Some(proxy) = proxies.get("https") else {
            return Ok(None);
        };
        if proxy.starts_with("https://") {
            return Err(Error::ProxyBadScheme(format!(
                "proxy {} for an https target must use the 'http://' prefix, not 'https://'",
                proxy
            )));
        }
        return Ok(Some(ProxySetting {
            url: proxy.clone(),
            tunnel: !proxy.starts_with("socks"),
        }));
    }

    Ok(None)
}
