//! Blocking RFC 9112 HTTP/1.1 exchange.
//!
//! Uses httparse for response parsing and raw I/O for full control over
//! request formatting and header order.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::TransportError;

/// Maximum response header size (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

const READ_CHUNK: usize = 8192;

/// Largest single chunk accepted in a chunked body (64MB).
const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Streams whose read timeout can be changed between reads.
pub trait ReadTimeout {
    fn apply_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl ReadTimeout for TcpStream {
    fn apply_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }
}

/// One final (non-1xx) response as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Status line and header block exactly as received, terminating blank
    /// line included.
    pub head: Bytes,
    pub headers: Vec<(String, String)>,
    /// Body with transfer framing removed. Content codings are left as is.
    pub body: Bytes,
}

impl RawResponse {
    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP/1.1 connection over any blocking byte stream.
///
/// With a deadline set, every read is bounded by the time left until it
/// and fails with a timeout once it has passed.
pub struct H1Connection<S> {
    stream: S,
    buffer: Vec<u8>,
    deadline: Option<Instant>,
}

impl<S: Read + Write + ReadTimeout> H1Connection<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(READ_CHUNK),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Extract the underlying stream.
    ///
    /// Bytes already read past the last response are dropped.
    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Send a request and read its final response.
    ///
    /// `target` is the request-target as it goes on the request line
    /// (origin-form, absolute-form for proxies, or authority-form for
    /// CONNECT); `host` is the Host header value.
    pub fn send_request(
        &mut self,
        method: &str,
        target: &str,
        host: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<RawResponse, TransportError> {
        let request = build_request(method, target, host, headers, body)?;
        self.stream.write_all(&request)?;
        if !body.is_empty() {
            self.stream.write_all(body)?;
        }
        self.stream.flush()?;

        self.read_response(method)
    }

    /// Read and parse a response, skipping any 1xx informational responses
    /// (RFC 9112 Section 6).
    pub fn read_response(&mut self, method: &str) -> Result<RawResponse, TransportError> {
        loop {
            let header_end = loop {
                if let Some(end) = find_header_end(&self.buffer) {
                    break end;
                }
                if self.buffer.len() >= MAX_HEADERS_SIZE {
                    return Err(TransportError::protocol("Response headers too large"));
                }
                if self.fill()? == 0 {
                    return Err(TransportError::protocol(
                        "Connection closed before response headers were complete",
                    ));
                }
            };

            let (status, headers) = parse_head(&self.buffer[..header_end])?;
            let head = Bytes::copy_from_slice(&self.buffer[..header_end]);
            self.buffer.drain(..header_end);

            if (100..200).contains(&status) {
                tracing::trace!("Skipping informational {} response", status);
                continue;
            }

            let body = self.read_body(method, status, &headers)?;
            return Ok(RawResponse {
                status,
                head,
                headers,
                body,
            });
        }
    }

    /// Per RFC 9112 Section 6.3: HEAD, 204, 304 and successful CONNECT
    /// responses carry no body; Transfer-Encoding overrides Content-Length;
    /// otherwise the body runs until the connection closes.
    fn read_body(&mut self, method: &str, status: u16, headers: &[(String, String)]) -> Result<Bytes, TransportError> {
        let no_body = method.eq_ignore_ascii_case("HEAD")
            || matches!(status, 204 | 304)
            || (method.eq_ignore_ascii_case("CONNECT") && (200..300).contains(&status));
        if no_body {
            return Ok(Bytes::new());
        }

        let transfer_encoding = find_header_value(headers, "transfer-encoding");
        let is_chunked = transfer_encoding
            .and_then(|v| v.split(',').next_back())
            .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);

        if is_chunked {
            return self.read_chunked_body();
        }
        if transfer_encoding.is_none() {
            if let Some(value) = find_header_value(headers, "content-length") {
                let len = parse_content_length(value)?;
                return self.read_fixed_body(len);
            }
        }
        self.read_until_close()
    }

    fn fill(&mut self) -> Result<usize, TransportError> {
        if let Some(deadline) = self.deadline {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(TransportError::timeout("operation timed out"));
            }
            self.stream
                .apply_read_timeout(Some(left.max(Duration::from_millis(1))))?;
        }
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.stream.read(&mut chunk)?;
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn read_until_close(&mut self) -> Result<Bytes, TransportError> {
        while self.fill()? > 0 {}
        Ok(Bytes::from(std::mem::take(&mut self.buffer)))
    }

    /// If the connection closes before `len` bytes arrive the message is
    /// incomplete (RFC 9112 Section 6.3).
    fn read_fixed_body(&mut self, len: usize) -> Result<Bytes, TransportError> {
        while self.buffer.len() < len {
            if self.fill()? == 0 {
                return Err(TransportError::protocol(format!(
                    "Connection closed before receiving full body (got {} of {} bytes)",
                    self.buffer.len(),
                    len
                )));
            }
        }
        Ok(Bytes::from(self.buffer.drain(..len).collect::<Vec<u8>>()))
    }

    /// chunked-body = *chunk last-chunk trailer-section CRLF
    fn read_chunked_body(&mut self) -> Result<Bytes, TransportError> {
        let mut body = Vec::new();
        loop {
            let (size, line_end) = loop {
                if let Some(found) = parse_chunk_size(&self.buffer)? {
                    break found;
                }
                if self.fill()? == 0 {
                    return Err(TransportError::protocol("Connection closed while reading chunk size"));
                }
            };
            self.buffer.drain(..line_end);

            if size == 0 {
                self.consume_trailers()?;
                return Ok(Bytes::from(body));
            }

            if size > MAX_CHUNK_SIZE {
                return Err(TransportError::protocol(format!(
                    "Chunk of {} bytes exceeds the {} byte limit",
                    size, MAX_CHUNK_SIZE
                )));
            }
            let chunk_end = size
                .checked_add(2)
                .ok_or_else(|| TransportError::protocol("Chunk size overflow"))?;
            while self.buffer.len() < chunk_end {
                if self.fill()? == 0 {
                    return Err(TransportError::protocol("Connection closed while reading chunk data"));
                }
            }
            body.extend_from_slice(&self.buffer[..size]);
            self.buffer.drain(..chunk_end);
        }
    }

    /// Skip trailer fields up to the terminating empty line. A connection
    /// closed before it is tolerated.
    fn consume_trailers(&mut self) -> Result<(), TransportError> {
        loop {
            if let Some(pos) = find_crlf(&self.buffer) {
                self.buffer.drain(..pos + 2);
                if pos == 0 {
                    return Ok(());
                }
                continue;
            }
            if self.fill()? == 0 {
                return Ok(());
            }
        }
    }
}

/// Serialize the request line and header block.
///
/// Host goes first; a caller-supplied Host is ignored. Content-Length is
/// added for non-empty bodies unless the caller set it or Transfer-Encoding.
pub fn build_request(
    method: &str,
    target: &str,
    host: &str,
    headers: &[(String, String)],
    body: &[u8],
) -> Result<Vec<u8>, TransportError> {
    if method.is_empty() || !method.bytes().all(is_tchar) {
        return Err(TransportError::protocol(format!("Invalid method: {:?}", method)));
    }
    for (name, value) in headers {
        validate_header_name(name)?;
        validate_header_value(value)?;
    }

    let mut request = Vec::with_capacity(1024);
    request.extend_from_slice(method.as_bytes());
    request.push(b' ');
    request.extend_from_slice(target.as_bytes());
    request.extend_from_slice(b" HTTP/1.1\r\n");

    request.extend_from_slice(b"Host: ");
    request.extend_from_slice(host.as_bytes());
    request.extend_from_slice(b"\r\n");

    let mut has_connection = false;
    let mut has_framing = false;
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        if name.eq_ignore_ascii_case("connection") {
            has_connection = true;
        }
        if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("transfer-encoding") {
            has_framing = true;
        }
        request.extend_from_slice(name.as_bytes());
        request.extend_from_slice(b": ");
        request.extend_from_slice(value.as_bytes());
        request.extend_from_slice(b"\r\n");
    }

    if !has_connection {
        request.extend_from_slice(b"Connection: keep-alive\r\n");
    }
    if !body.is_empty() && !has_framing {
        request.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }

    request.extend_from_slice(b"\r\n");
    Ok(request)
}

fn parse_head(head: &[u8]) -> Result<(u16, Vec<(String, String)>), TransportError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
    let mut response = httparse::Response::new(&mut headers);

    match response.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(TransportError::protocol("Incomplete response headers"));
        }
        Err(e) => {
            return Err(TransportError::protocol(format!("Failed to parse response: {}", e)));
        }
    }

    let status = response
        .code
        .ok_or_else(|| TransportError::protocol("Missing status code"))?;
    let headers = response
        .headers
        .iter()
        .filter(|h| !h.name.is_empty())
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();
    Ok((status, headers))
}

/// Find the end of HTTP headers (\r\n\r\n).
fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn find_header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parse a chunk-size line, returning (size, end_of_line_position).
///
/// `None` means the line is not complete yet.
fn parse_chunk_size(buffer: &[u8]) -> Result<Option<(usize, usize)>, TransportError> {
    let Some(pos) = find_crlf(buffer) else {
        return Ok(None);
    };
    let line = String::from_utf8_lossy(&buffer[..pos]);
    let size_part = line.split(';').next().unwrap_or("").trim();
    let size = usize::from_str_radix(size_part, 16)
        .map_err(|_| TransportError::protocol(format!("Invalid chunk size: {:?}", size_part)))?;
    Ok(Some((size, pos + 2)))
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}

/// Header names must be tokens (RFC 9110 Section 5.1).
fn validate_header_name(name: &str) -> Result<(), TransportError> {
    if name.is_empty() || !name.bytes().all(is_tchar) {
        return Err(TransportError::protocol(format!(
            "Invalid header name: {:?}",
            name
        )));
    }
    Ok(())
}

fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}

/// Header values must not contain NUL, CR, or LF.
fn validate_header_value(value: &str) -> Result<(), TransportError> {
    if value.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n') {
        return Err(TransportError::protocol(
            "Invalid character in header value (CR/LF/NUL not allowed)",
        ));
    }
    Ok(())
}

/// Multiple comma-separated values must all be identical (RFC 9112 Section 6.2).
fn parse_content_length(value: &str) -> Result<usize, TransportError> {
    let invalid = || TransportError::protocol(format!("Invalid Content-Length: {}", value));

    let mut parts = value.split(',').map(str::trim);
    let first = parts
        .next()
        .and_then(|p| p.parse::<usize>().ok())
        .ok_or_else(invalid)?;
    for part in parts {
        let other = part.parse::<usize>().map_err(|_| invalid())?;
        if other != first {
            return Err(TransportError::protocol(format!(
                "Conflicting Content-Length values: {}",
                value
            )));
        }
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Scripted stream: reads come from `input`, writes are recorded.
    struct Scripted {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Scripted {
        fn new(input: &[u8]) -> Self {
            Self {
                input: Cursor::new(input.to_vec()),
                written: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl ReadTimeout for Scripted {
        fn apply_read_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn exchange(method: &str, input: &[u8]) -> Result<RawResponse, TransportError> {
        H1Connection::new(Scripted::new(input)).send_request(method, "/", "example.test", &[], b"")
    }

    #[test]
    fn test_request_layout() {
        let headers = vec![
            ("User-Agent".to_string(), "ua".to_string()),
            ("Host".to_string(), "ignored".to_string()),
            ("Accept".to_string(), "*/*".to_string()),
        ];
        let raw = build_request("POST", "/submit?x=1", "example.test:8080", &headers, b"abc").unwrap();
        assert_eq!(
            String::from_utf8(raw).unwrap(),
            "POST /submit?x=1 HTTP/1.1\r\n\
             Host: example.test:8080\r\n\
             User-Agent: ua\r\n\
             Accept: */*\r\n\
             Connection: keep-alive\r\n\
             Content-Length: 3\r\n\r\n"
        );
    }

    #[test]
    fn test_header_injection_rejected() {
        let headers = vec![("X-Evil".to_string(), "a\r\nInjected: 1".to_string())];
        assert!(build_request("GET", "/", "h", &headers, b"").is_err());
        let headers = vec![("Bad Name".to_string(), "v".to_string())];
        assert!(build_request("GET", "/", "h", &headers, b"").is_err());
        assert!(build_request("GE T", "/", "h", &[], b"").is_err());
    }

    #[test]
    fn test_content_length_body() {
        let rsp = exchange("GET", b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello trailing").unwrap();
        assert_eq!(rsp.status, 200);
        assert_eq!(&rsp.body[..], b"hello");
        assert_eq!(&rsp.head[..], b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n");
    }

    #[test]
    fn test_chunked_body_with_trailers() {
        let rsp = exchange(
            "GET",
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5;ext=1\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: t\r\n\r\n",
        )
        .unwrap();
        assert_eq!(&rsp.body[..], b"hello world");
    }

    #[test]
    fn test_close_delimited_body() {
        let rsp = exchange("GET", b"HTTP/1.1 200 OK\r\n\r\nuntil close").unwrap();
        assert_eq!(&rsp.body[..], b"until close");
    }

    #[test]
    fn test_head_has_no_body() {
        let rsp = exchange("HEAD", b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n").unwrap();
        assert!(rsp.body.is_empty());
        assert_eq!(rsp.header("content-length"), Some("100"));
    }

    #[test]
    fn test_informational_responses_skipped() {
        let rsp = exchange(
            "GET",
            b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 103 Early Hints\r\nLink: </a>\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n",
        )
        .unwrap();
        assert_eq!(rsp.status, 204);
        assert!(rsp.head.starts_with(b"HTTP/1.1 204"));
    }

    #[test]
    fn test_truncated_body_is_error() {
        let err = exchange("GET", b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort").unwrap_err();
        assert!(err.message().contains("got 5 of 10"));
    }

    #[test]
    fn test_truncated_head_is_error() {
        assert!(exchange("GET", b"HTTP/1.1 200 OK\r\nContent-").is_err());
    }

    #[test]
    fn test_bad_chunk_size_is_error() {
        assert!(exchange("GET", b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n").is_err());
    }

    #[test]
    fn test_oversized_chunk_is_error() {
        let err = exchange(
            "GET",
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nFFFFFFFFFFFFFFFF\r\nab\r\n0\r\n\r\n",
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::TransportErrorKind::Protocol);

        let err = exchange(
            "GET",
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4000001\r\nab\r\n",
        )
        .unwrap_err();
        assert!(err.message().contains("exceeds"));
    }

    #[test]
    fn test_passed_deadline_times_out() {
        let past = Instant::now().checked_sub(Duration::from_secs(1)).unwrap();
        let err = H1Connection::new(Scripted::new(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"))
            .with_deadline(Some(past))
            .send_request("GET", "/", "example.test", &[], b"")
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::TransportErrorKind::Timeout);
    }

    #[test]
    fn test_parse_content_length() {
        assert_eq!(parse_content_length("100").unwrap(), 100);
        assert_eq!(parse_content_length("100, 100").unwrap(), 100);
        assert!(parse_content_length("100, 200").is_err());
        assert!(parse_content_length("-1").is_err());
        assert!(parse_content_length("100.5").is_err());
    }

    #[test]
    fn test_parse_chunk_size() {
        assert_eq!(parse_chunk_size(b"a\r\n").unwrap(), Some((10, 3)));
        assert_eq!(parse_chunk_size(b"10;name=value\r\n").unwrap(), Some((16, 15)));
        assert_eq!(parse_chunk_size(b"10").unwrap(), None);
        assert!(parse_chunk_size(b"XYZ\r\n").is_err());
    }
}
