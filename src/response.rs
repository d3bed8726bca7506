//! HTTP response reconstructed from raw transport output.

use std::time::Duration;

use bytes::Bytes;

use crate::cookie::{Cookie, CookieJar};
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::request::Request;
use crate::transport::TransferInfo;

const DEFAULT_CHARSET: &str = "utf-8";

/// Response of the final hop of a transfer.
#[derive(Debug, Clone)]
pub struct Response {
    pub request: Request,
    /// Effective URL, after redirects.
    pub url: String,
    pub content: Bytes,
    pub status_code: u16,
    /// `200 <= status_code < 400`.
    pub ok: bool,
    /// Reason phrase of the final hop.
    pub reason: String,
    /// Headers of the final hop only.
    pub headers: Headers,
    pub charset: String,
    /// Same value as `charset`.
    pub encoding: String,
    pub elapsed: Duration,
    pub redirect_count: u32,
    /// Engine-reported redirect target; empty when none was left unfollowed.
    pub redirect_url: String,
}

impl Response {
    /// Rebuild a response from the captured body, the raw header stream and
    /// the transfer info.
    ///
    /// The header stream holds one status line plus header block per hop.
    /// Each status line starts a new block, so only the last hop's reason
    /// and headers survive.
    pub fn reconstruct(
        request: Request,
        content: Bytes,
        raw_headers: &[u8],
        info: TransferInfo,
        reason_phrase: impl Fn(&[u8]) -> String,
    ) -> Self {
        let mut reason = String::new();
        let mut lines: Vec<String> = Vec::new();

        for line in raw_headers.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            if line.starts_with(b"HTTP/") {
                reason = reason_phrase(line);
                lines.clear();
                continue;
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
        }

        let headers = Headers::from_lines(&lines);
        let charset = detect_charset(headers.get("Content-Type").unwrap_or(""));
        let status_code = info.response_code;

        Self {
            request,
            url: info.effective_url,
            content,
            status_code,
            ok: (200..400).contains(&status_code),
            reason,
            headers,
            encoding: charset.clone(),
            charset,
            elapsed: info.total_time,
            redirect_count: info.redirect_count,
            redirect_url: info.redirect_url,
        }
    }

    /// Content decoded with the detected charset.
    ///
    /// Single-byte Latin charsets are mapped byte for byte; anything else is
    /// treated as UTF-8 with invalid sequences replaced.
    pub fn text(&self) -> String {
        match self.charset.to_ascii_lowercase().as_str() {
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" | "ascii" | "us-ascii" => {
                self.content.iter().map(|&b| char::from(b)).collect()
            }
            _ => String::from_utf8_lossy(&self.content).into_owned(),
        }
    }

    /// Deserialize the content as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.content).map_err(Error::from)
    }

    /// Fail with [`Error::HttpStatus`] for 4xx and 5xx statuses.
    pub fn raise_for_status(&self) -> Result<&Self> {
        if (400..600).contains(&self.status_code) {
            return Err(Error::http_status(self.status_code, self.reason.clone()));
        }
        Ok(self)
    }

    /// Cookies set by the final hop.
    pub fn cookies(&self) -> CookieJar {
        let mut jar = CookieJar::new();
        for value in self.headers.get_all("Set-Cookie") {
            if let Ok(cookie) = Cookie::from_set_cookie_header(value, &self.url) {
                jar.store(cookie);
            }
        }
        jar
    }
}

/// Value of the first `charset=` parameter made of word characters and
/// hyphens, or `utf-8`.
pub fn detect_charset(content_type: &str) -> String {
    for (idx, marker) in content_type.match_indices("charset=") {
        let rest = &content_type[idx + marker.len()..];
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        if end > 0 {
            return rest[..end].to_string();
        }
    }
    DEFAULT_CHARSET.to_string()
}
