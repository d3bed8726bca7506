//! Blocking TCP/BoringSSL connector.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use boring::ssl::{SslConnector, SslMethod, SslSessionCacheMode, SslStream, SslVerifyMode, SslVersion};

use crate::error::{TransportError, TransportErrorKind};
use crate::fingerprint::tls::{CertCompression, TlsFingerprint};
use crate::transport::h1::ReadTimeout;

// FFI bindings for certificate decompression callbacks
use boring_sys::{CRYPTO_BUFFER, SSL, SSL_CTX};
use std::os::raw::c_int;

/// Brotli certificate decompression callback for BoringSSL.
unsafe extern "C" fn decompress_brotli_cert(
    _ssl: *mut SSL,
    out: *mut *mut CRYPTO_BUFFER,
    uncompressed_len: usize,
    in_: *const u8,
    in_len: usize,
) -> c_int {
    let compressed = std::slice::from_raw_parts(in_, in_len);
    let mut decompressed = Vec::with_capacity(uncompressed_len);
    let mut decoder = brotli::Decompressor::new(compressed, uncompressed_len);
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) if decompressed.len() == uncompressed_len => store_cert_buffer(out, &decompressed),
        _ => 0,
    }
}

/// Zlib certificate decompression callback for BoringSSL.
unsafe extern "C" fn decompress_zlib_cert(
    _ssl: *mut SSL,
    out: *mut *mut CRYPTO_BUFFER,
    uncompressed_len: usize,
    in_: *const u8,
    in_len: usize,
) -> c_int {
    let compressed = std::slice::from_raw_parts(in_, in_len);
    let mut decompressed = Vec::with_capacity(uncompressed_len);
    let mut decoder = flate2::read::ZlibDecoder::new(compressed);
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) if decompressed.len() == uncompressed_len => store_cert_buffer(out, &decompressed),
        _ => 0,
    }
}

/// CRYPTO_BUFFER_new copies `data`, so the caller keeps ownership.
unsafe fn store_cert_buffer(out: *mut *mut CRYPTO_BUFFER, data: &[u8]) -> c_int {
    let buffer = boring_sys::CRYPTO_BUFFER_new(data.as_ptr(), data.len(), std::ptr::null_mut());
    if buffer.is_null() {
        return 0;
    }
    *out = buffer;
    1
}

/// Open a TCP connection, resolving `host` first.
///
/// Every resolved address is tried in turn with the same connect timeout.
pub fn connect_tcp(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream, TransportError> {
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| TransportError::new(TransportErrorKind::Dns, format!("{}: {}", host, e)))?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::new(
            TransportErrorKind::Dns,
            format!("no addresses found for {}", host),
        ));
    }

    let mut last_err = None;
    for addr in addrs {
        let attempt = match timeout {
            Some(t) => TcpStream::connect_timeout(&addr, t.max(Duration::from_millis(1))),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }

    let err = last_err.map(TransportError::from).unwrap_or_else(|| {
        TransportError::new(TransportErrorKind::Connect, format!("could not connect to {}", host))
    });
    Err(TransportError::new(
        err.kind(),
        format!("{}:{}: {}", host, port, err.message()),
    ))
}

/// BoringSSL client connector shaped by a browser fingerprint.
#[derive(Debug, Clone)]
pub struct TlsConnector {
    fingerprint: Option<TlsFingerprint>,
    verify_peer: bool,
    verify_host: bool,
}

impl Default for TlsConnector {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TlsConnector {
    pub fn new(fingerprint: Option<TlsFingerprint>) -> Self {
        Self {
            fingerprint,
            verify_peer: true,
            verify_host: true,
        }
    }

    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    pub fn verify_host(mut self, verify: bool) -> Self {
        self.verify_host = verify;
        self
    }

    fn configure_ssl(&self) -> Result<SslConnector, TransportError> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| TransportError::tls(format!("Failed to create SSL connector: {}", e)))?;

        if let Some(fp) = &self.fingerprint {
            if !fp.cipher_list.is_empty() {
                builder
                    .set_cipher_list(&fp.cipher_list.join(":"))
                    .map_err(|e| TransportError::tls(format!("Failed to set cipher list: {}", e)))?;
            }
            if !fp.curves.is_empty() {
                builder
                    .set_curves_list(&fp.curves.join(":"))
                    .map_err(|e| TransportError::tls(format!("Failed to set curves: {}", e)))?;
            }
            if !fp.sigalgs.is_empty() {
                builder.set_sigalgs_list(&fp.sigalgs.join(":")).map_err(|e| {
                    TransportError::tls(format!("Failed to set signature algorithms: {}", e))
                })?;
            }

            unsafe {
                let ctx = builder.as_ptr() as *mut SSL_CTX;
                boring_sys::SSL_CTX_set_grease_enabled(ctx, c_int::from(fp.grease));
                boring_sys::SSL_CTX_set_permute_extensions(ctx, c_int::from(fp.permute_extensions));

                // Decompression only; the client never sends certificates.
                match fp.cert_compression {
                    CertCompression::Brotli => {
                        boring_sys::SSL_CTX_add_cert_compression_alg(
                            ctx,
                            boring_sys::TLSEXT_cert_compression_brotli as u16,
                            None,
                            Some(decompress_brotli_cert),
                        );
                    }
                    CertCompression::Zlib => {
                        boring_sys::SSL_CTX_add_cert_compression_alg(
                            ctx,
                            boring_sys::TLSEXT_cert_compression_zlib as u16,
                            None,
                            Some(decompress_zlib_cert),
                        );
                    }
                    CertCompression::None => {}
                }
            }
        }

        builder
            .set_min_proto_version(Some(SslVersion::TLS1_2))
            .map_err(|e| TransportError::tls(format!("Failed to set min TLS version: {}", e)))?;
        builder
            .set_max_proto_version(Some(SslVersion::TLS1_3))
            .map_err(|e| TransportError::tls(format!("Failed to set max TLS version: {}", e)))?;

        builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);

        // The engine speaks HTTP/1.1 only.
        builder
            .set_alpn_protos(b"\x08http/1.1")
            .map_err(|e| TransportError::tls(format!("Failed to set ALPN: {}", e)))?;

        if !self.verify_peer {
            builder.set_verify(SslVerifyMode::NONE);
        }

        Ok(builder.build())
    }

    /// Run the TLS handshake for `domain` over an established stream.
    pub fn connect<S: Read + Write>(&self, domain: &str, stream: S) -> Result<SslStream<S>, TransportError> {
        let connector = self.configure_ssl()?;
        let mut config = connector
            .configure()
            .map_err(|e| TransportError::tls(format!("Failed to configure SSL: {}", e)))?;
        if !self.verify_host {
            config.set_verify_hostname(false);
        }

        config
            .connect(domain, stream)
            .map_err(|e| TransportError::tls(format!("TLS handshake with {} failed: {}", domain, e)))
    }
}

/// Plain TCP or TLS-wrapped TCP.
#[derive(Debug)]
pub enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(Box<SslStream<TcpStream>>),
}

impl MaybeTlsStream {
    fn tcp(&self) -> &TcpStream {
        match self {
            Self::Plain(s) => s,
            Self::Tls(s) => s.get_ref(),
        }
    }

    /// Apply a read/write timeout to the underlying socket.
    pub fn set_io_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        let timeout = timeout.map(|t| t.max(Duration::from_millis(1)));
        self.tcp().set_read_timeout(timeout)?;
        self.tcp().set_write_timeout(timeout)
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl ReadTimeout for MaybeTlsStream {
    fn apply_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.tcp()
            .set_read_timeout(timeout.map(|t| t.max(Duration::from_millis(1))))
    }
}

impl Read for MaybeTlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.read(buf),
            Self::Tls(s) => s.read(buf),
        }
    }
}

impl Write for MaybeTlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.write(buf),
            Self::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(s) => s.flush(),
            Self::Tls(s) => s.flush(),
        }
    }
}
