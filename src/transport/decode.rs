//! Content-Encoding decoders (gzip, deflate, br, zstd).

use std::io::Read;

use bytes::Bytes;

use crate::error::TransportError;

/// Every encoding the engine can decode, as advertised for an empty
/// Accept-Encoding option.
pub const SUPPORTED_ENCODINGS: &str = "gzip, deflate, br, zstd";

/// Undo a `Content-Encoding` header value.
///
/// Codings are listed in the order they were applied, so they are removed
/// right to left. `identity` and an empty value leave the body untouched.
pub fn decode_body(content_encoding: &str, body: Bytes) -> Result<Bytes, TransportError> {
    let mut decoded = body;
    for coding in content_encoding.rsplit(',') {
        decoded = match coding.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => decoded,
            "gzip" | "x-gzip" => decode_gzip(&decoded)?,
            "deflate" => decode_deflate(&decoded)?,
            "br" => decode_brotli(&decoded)?,
            "zstd" => decode_zstd(&decoded)?,
            other => {
                return Err(TransportError::protocol(format!(
                    "unsupported content encoding: {}",
                    other
                )))
            }
        };
    }
    Ok(decoded)
}

fn decode_gzip(data: &[u8]) -> Result<Bytes, TransportError> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| TransportError::protocol(format!("gzip: {}", e)))?;
    Ok(Bytes::from(decoded))
}

/// Servers disagree on whether "deflate" means zlib-wrapped or raw; try both.
fn decode_deflate(data: &[u8]) -> Result<Bytes, TransportError> {
    let mut decoded = Vec::new();
    if flate2::read::ZlibDecoder::new(data).read_to_end(&mut decoded).is_ok() {
        return Ok(Bytes::from(decoded));
    }
    decoded.clear();
    flate2::read::DeflateDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| TransportError::protocol(format!("deflate: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_brotli(data: &[u8]) -> Result<Bytes, TransportError> {
    let mut decoder = brotli::Decompressor::new(data, 4096);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| TransportError::protocol(format!("brotli: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_zstd(data: &[u8]) -> Result<Bytes, TransportError> {
    zstd::stream::decode_all(data)
        .map(Bytes::from)
        .map_err(|e| TransportError::protocol(format!("zstd: {}", e)))
}
