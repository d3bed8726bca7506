//! RFC 6265 compliant cookie handling.
//!
//! The jar is consulted explicitly when a request is built
//! ([`CookieJar::set_cookie_header`]) and fed explicitly after a response is
//! parsed ([`CookieJar::extract_cookies`]); nothing happens implicitly.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use url::Url;

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;

/// SameSite attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// RFC 6265 compliant cookie representation.
///
/// An empty `domain` marks a cookie set directly by the caller
/// ([`CookieJar::set`]); such cookies are sent to every host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub host_only: bool,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            path: "/".to_string(),
            host_only: false,
            secure: false,
            http_only: false,
            same_site: None,
            expires: None,
            max_age: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Parse a `Set-Cookie` header value received from `request_url`.
    pub fn from_set_cookie_header(header: &str, request_url: &str) -> Result<Self> {
        let parsed_url = Url::parse(request_url).map_err(|e| Error::CookieParse(e.to_string()))?;
        let request_host = parsed_url
            .host_str()
            .ok_or_else(|| Error::CookieParse("No host in URL".to_string()))?
            .to_ascii_lowercase();

        let mut parts = header.split(';').map(str::trim);
        let (name, value) = match parts.next().and_then(|p| p.split_once('=')) {
            Some((n, v)) => (n.trim().to_string(), v.trim().to_string()),
            None => return Err(Error::CookieParse("No = in cookie".to_string())),
        };
        if name.is_empty() {
            return Err(Error::CookieParse("Empty cookie name".to_string()));
        }

        let mut cookie = Cookie::new(name, value, request_host.as_str());
        cookie.host_only = true;
        cookie.path = default_path(parsed_url.path());

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim().to_ascii_lowercase(), v.trim()),
                None => (attr.to_ascii_lowercase(), ""),
            };
            match key.as_str() {
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "domain" if !val.is_empty() => {
                    let domain = normalize_domain(val);
                    if !domain.contains('.') {
                        return Err(Error::CookieParse(format!(
                            "Refusing cookie for top-level domain {:?}",
                            domain
                        )));
                    }
                    if !domain_matches(&request_host, &domain) {
                        return Err(Error::CookieParse(format!(
                            "Domain {:?} does not match host {:?}",
                            domain, request_host
                        )));
                    }
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "expires" => cookie.expires = parse_cookie_date(val),
                "max-age" => cookie.max_age = val.parse().ok(),
                "samesite" => cookie.same_site = SameSite::parse(val),
                _ => {}
            }
        }

        if cookie.same_site == Some(SameSite::None) && !cookie.secure {
            return Err(Error::CookieParse(
                "SameSite=None requires the Secure attribute".to_string(),
            ));
        }

        // Max-Age takes precedence over Expires (RFC 6265 section 5.3 step 3).
        if let Some(max_age) = cookie.max_age {
            cookie.expires = ChronoDuration::try_seconds(max_age.max(0))
                .and_then(|age| Utc::now().checked_add_signed(age));
        }

        Ok(cookie)
    }

    pub fn is_expired(&self) -> bool {
        if matches!(self.max_age, Some(age) if age <= 0) {
            return true;
        }
        matches!(self.expires, Some(expires) if expires <= Utc::now())
    }

    pub fn matches_url(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return false,
        };
        let request_host = match parsed.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return false,
        };

        if self.secure && parsed.scheme() != "https" {
            return false;
        }
        if self.is_expired() {
            return false;
        }

        if !self.domain.is_empty() {
            let host_ok = if self.host_only {
                request_host == self.domain
            } else {
                domain_matches(&request_host, &self.domain)
            };
            if !host_ok {
                return false;
            }
        }

        path_matches(parsed.path(), &self.path)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Cookie store keyed by domain, then by `(path, name)`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CookieJar {
    cookies: BTreeMap<String, BTreeMap<(String, String), Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a cookie, replacing one with the same domain, path and name.
    ///
    /// An already-expired cookie deletes its stored counterpart instead.
    pub fn store(&mut self, cookie: Cookie) {
        if cookie.is_expired() {
            self.remove(&cookie.domain, &cookie.path, &cookie.name);
            return;
        }
        self.cookies
            .entry(cookie.domain.clone())
            .or_default()
            .insert((cookie.path.clone(), cookie.name.clone()), cookie);
    }

    /// Store a host-agnostic `name=value` cookie.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.store(Cookie::new(name, value, ""));
    }

    /// Copy every cookie of `other` into this jar; `other` wins on conflicts.
    pub fn update(&mut self, other: &CookieJar) {
        for cookie in other.cookies() {
            self.store(cookie.clone());
        }
    }

    pub fn cookies(&self) -> Vec<&Cookie> {
        self.cookies.values().flat_map(|m| m.values()).collect()
    }

    /// Cookies to send to `url`, longest path first.
    pub fn cookies_for_url(&self, url: &str) -> Vec<&Cookie> {
        let mut matching: Vec<&Cookie> = self
            .cookies
            .values()
            .flat_map(|m| m.values())
            .filter(|c| c.matches_url(url))
            .collect();
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        matching
    }

    pub fn build_cookie_header(&self, url: &str) -> Option<String> {
        let cookies = self.cookies_for_url(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Attach a `Cookie` header for the request's URL.
    ///
    /// A `Cookie` header the caller already put on the request is kept.
    pub fn set_cookie_header(&self, request: &mut Request) {
        if request.headers.contains("Cookie") {
            return;
        }
        if let Some(value) = self.build_cookie_header(&request.url) {
            request.headers.append("Cookie", value);
        }
    }

    /// Store every `Set-Cookie` of the response, scoped to its effective URL.
    pub fn extract_cookies(&mut self, response: &Response) {
        for value in response.headers.get_all("Set-Cookie") {
            match Cookie::from_set_cookie_header(value, &response.url) {
                Ok(cookie) => self.store(cookie),
                Err(e) => tracing::warn!("Ignoring Set-Cookie from {}: {}", response.url, e),
            }
        }
    }

    pub fn get(&self, domain: &str, path: &str, name: &str) -> Option<&Cookie> {
        self.cookies
            .get(&normalize_domain(domain))?
            .get(&(path.to_string(), name.to_string()))
    }

    /// Value of the first cookie called `name`, whatever its domain.
    pub fn get_value(&self, name: &str) -> Option<&str> {
        self.cookies()
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    pub fn remove(&mut self, domain: &str, path: &str, name: &str) -> Option<Cookie> {
        let domain = normalize_domain(domain);
        let by_name = self.cookies.get_mut(&domain)?;
        let removed = by_name.remove(&(path.to_string(), name.to_string()));
        if by_name.is_empty() {
            self.cookies.remove(&domain);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn len(&self) -> usize {
        self.cookies.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CookieJar {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut jar = CookieJar::new();
        for (name, value) in iter {
            jar.set(name, value);
        }
        jar
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for CookieJar {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Lowercase and strip leading/trailing dots.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim_matches('.').to_ascii_lowercase()
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// RFC 6265 section 5.1.4 default-path.
fn default_path(request_path: &str) -> String {
    if !request_path.starts_with('/') {
        return "/".to_string();
    }
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path[..idx].to_string(),
    }
}

fn parse_cookie_date(date_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%a, %d %b %Y %H:%M:%S GMT",
        "%a, %d-%b-%Y %H:%M:%S GMT",
        "%a, %d-%b-%y %H:%M:%S GMT",
        "%A, %d-%b-%y %H:%M:%S GMT",
    ] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    date_str
        .parse::<i64>()
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}
