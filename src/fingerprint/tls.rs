//! TLS ClientHello fingerprint data per browser family.

/// Chromium 99-104 cipher suites in exact order.
pub const CHROMIUM_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
];

/// Chromium signature algorithms.
pub const CHROMIUM_SIGNATURE_ALGORITHMS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
];

/// Chromium supported groups.
pub const CHROMIUM_CURVES: &[&str] = &["X25519", "P-256", "P-384"];

/// Safari 15 cipher suites in exact order.
pub const SAFARI_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_ECDSA_WITH_3DES_EDE_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA",
    "TLS_RSA_WITH_3DES_EDE_CBC_SHA",
];

/// Safari signature algorithms.
pub const SAFARI_SIGNATURE_ALGORITHMS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "ecdsa_sha1",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
    "rsa_pkcs1_sha1",
];

/// Safari supported groups.
pub const SAFARI_CURVES: &[&str] = &["X25519", "P-256", "P-384", "P-521"];

/// Certificate compression algorithm advertised in `compress_certificate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertCompression {
    #[default]
    None,
    Brotli,
    Zlib,
}

/// TLS fingerprint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TlsFingerprint {
    /// Cipher suites in order.
    pub cipher_list: Vec<&'static str>,
    /// Signature algorithms.
    pub sigalgs: Vec<&'static str>,
    /// Supported curves/groups.
    pub curves: Vec<&'static str>,
    /// Enable GREASE values.
    pub grease: bool,
    /// Randomize extension order (Chrome 110+; off for the profiles here).
    pub permute_extensions: bool,
    pub cert_compression: CertCompression,
}

impl TlsFingerprint {
    /// Chrome/Edge 99-104, desktop and Android.
    pub fn chromium() -> Self {
        Self {
            cipher_list: CHROMIUM_CIPHER_SUITES.to_vec(),
            sigalgs: CHROMIUM_SIGNATURE_ALGORITHMS.to_vec(),
            curves: CHROMIUM_CURVES.to_vec(),
            grease: true,
            permute_extensions: false,
            cert_compression: CertCompression::Brotli,
        }
    }

    /// Safari 15.x on macOS.
    pub fn safari() -> Self {
        Self {
            cipher_list: SAFARI_CIPHER_SUITES.to_vec(),
            sigalgs: SAFARI_SIGNATURE_ALGORITHMS.to_vec(),
            curves: SAFARI_CURVES.to_vec(),
            grease: true,
            permute_extensions: false,
            cert_compression: CertCompression::Zlib,
        }
    }
}
