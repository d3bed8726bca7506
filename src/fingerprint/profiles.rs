//! Browser impersonation profiles.

use std::fmt;
use std::str::FromStr;

use super::tls::TlsFingerprint;
use crate::error::Error;

/// Supported browser/version impersonation targets.
///
/// Parsing from a tag (`"chrome101"`, `"safari15_5"`, ...) is the only way
/// an unknown target is rejected, and it happens before any transport
/// option is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserType {
    Edge99,
    Edge101,
    Chrome99,
    Chrome100,
    Chrome101,
    Chrome104,
    Chrome99Android,
    Safari15_3,
    Safari15_5,
}

impl BrowserType {
    /// Every supported profile.
    pub const ALL: [BrowserType; 9] = [
        Self::Edge99,
        Self::Edge101,
        Self::Chrome99,
        Self::Chrome100,
        Self::Chrome101,
        Self::Chrome104,
        Self::Chrome99Android,
        Self::Safari15_3,
        Self::Safari15_5,
    ];

    /// Tag understood by the transport.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edge99 => "edge99",
            Self::Edge101 => "edge101",
            Self::Chrome99 => "chrome99",
            Self::Chrome100 => "chrome100",
            Self::Chrome101 => "chrome101",
            Self::Chrome104 => "chrome104",
            Self::Chrome99Android => "chrome99_android",
            Self::Safari15_3 => "safari15_3",
            Self::Safari15_5 => "safari15_5",
        }
    }

    pub fn is_safari(&self) -> bool {
        matches!(self, Self::Safari15_3 | Self::Safari15_5)
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, Self::Chrome99Android)
    }

    /// Get the User-Agent string for this profile.
    pub fn user_agent(&self) -> &'static str {
        match self {
            Self::Edge99 => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/99.0.4844.51 Safari/537.36 Edg/99.0.1150.30",
            Self::Edge101 => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/101.0.4951.64 Safari/537.36 Edg/101.0.1210.47",
            Self::Chrome99 => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/99.0.4844.51 Safari/537.36",
            Self::Chrome100 => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/100.0.4896.75 Safari/537.36",
            Self::Chrome101 => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/101.0.4951.67 Safari/537.36",
            Self::Chrome104 => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/104.0.5112.81 Safari/537.36",
            Self::Chrome99Android => "Mozilla/5.0 (Linux; Android 12; Pixel 6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/99.0.4844.58 Mobile Safari/537.36",
            Self::Safari15_3 => "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.3 Safari/605.1.15",
            Self::Safari15_5 => "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.5 Safari/605.1.15",
        }
    }

    fn sec_ch_ua(&self) -> Option<&'static str> {
        match self {
            Self::Edge99 => Some(r#"" Not A;Brand";v="99", "Chromium";v="99", "Microsoft Edge";v="99""#),
            Self::Edge101 => Some(r#"" Not A;Brand";v="99", "Chromium";v="101", "Microsoft Edge";v="101""#),
            Self::Chrome99 | Self::Chrome99Android => {
                Some(r#"" Not A;Brand";v="99", "Chromium";v="99", "Google Chrome";v="99""#)
            }
            Self::Chrome100 => Some(r#"" Not A;Brand";v="99", "Chromium";v="100", "Google Chrome";v="100""#),
            Self::Chrome101 => Some(r#"" Not A;Brand";v="99", "Chromium";v="101", "Google Chrome";v="101""#),
            Self::Chrome104 => Some(r#""Chromium";v="104", " Not A;Brand";v="99", "Google Chrome";v="104""#),
            Self::Safari15_3 | Self::Safari15_5 => None,
        }
    }

    /// Navigation headers in the order the browser sends them.
    ///
    /// The bundled engine sends these when impersonating; caller-supplied
    /// headers replace them by name.
    pub fn default_headers(&self) -> Vec<(&'static str, &'static str)> {
        if self.is_safari() {
            return vec![
                ("User-Agent", self.user_agent()),
                ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                ("Accept-Language", "en-us"),
                ("Accept-Encoding", "gzip, deflate, br"),
            ];
        }

        let mut headers = Vec::with_capacity(12);
        if let Some(ua) = self.sec_ch_ua() {
            headers.push(("sec-ch-ua", ua));
        }
        headers.push(("sec-ch-ua-mobile", if self.is_mobile() { "?1" } else { "?0" }));
        headers.push((
            "sec-ch-ua-platform",
            if self.is_mobile() { r#""Android""# } else { r#""Windows""# },
        ));
        headers.push(("Upgrade-Insecure-Requests", "1"));
        headers.push(("User-Agent", self.user_agent()));
        headers.push((
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9",
        ));
        headers.push(("Sec-Fetch-Site", "none"));
        headers.push(("Sec-Fetch-Mode", "navigate"));
        headers.push(("Sec-Fetch-User", "?1"));
        headers.push(("Sec-Fetch-Dest", "document"));
        headers.push(("Accept-Encoding", "gzip, deflate, br"));
        headers.push(("Accept-Language", "en-US,en;q=0.9"));
        headers
    }

    /// Get the TLS fingerprint for this profile.
    pub fn tls_fingerprint(&self) -> TlsFingerprint {
        if self.is_safari() {
            TlsFingerprint::safari()
        } else {
            TlsFingerprint::chromium()
        }
    }
}

impl FromStr for BrowserType {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|b| b.as_str() == tag)
            .ok_or_else(|| Error::UnsupportedImpersonation(tag.to_string()))
    }
}

impl fmt::Display for BrowserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<BrowserType> for String {
    fn from(browser: BrowserType) -> Self {
        browser.as_str().to_string()
    }
}
