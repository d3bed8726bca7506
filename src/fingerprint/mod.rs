//! Browser impersonation profiles and their TLS fingerprints.

pub mod profiles;
pub mod tls;

pub use profiles::BrowserType;
pub use tls::{CertCompression, TlsFingerprint};
