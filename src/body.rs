//! Request body sources and their resolution to bytes.

use std::fmt;
use std::io::Read;

use bytes::Bytes;
use serde_json::Value;
use url::form_urlencoded;

use crate::error::{Error, Result};
use crate::params::param_text;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The `data` argument of a request.
pub enum Data {
    /// Mapping, sent form-url-encoded.
    Form(Vec<(String, String)>),
    /// Byte stream, read to the end when the request is prepared.
    Reader(Box<dyn Read + Send>),
    /// Raw bytes, sent as-is.
    Bytes(Bytes),
    /// Dynamically shaped input; only a JSON object (treated as a
    /// mapping) is accepted.
    Value(Value),
}

impl Data {
    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Form(pairs) => f.debug_tuple("Form").field(pairs).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

impl From<Bytes> for Data {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<u8>> for Data {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(b))
    }
}

impl From<&'static [u8]> for Data {
    fn from(b: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(b))
    }
}

impl From<Value> for Data {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

/// Serialized body plus the content type the session must force, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedBody {
    pub bytes: Bytes,
    pub content_type: Option<&'static str>,
}

/// Resolve `data` and `json` into the bytes that go on the wire.
///
/// `json` wins over any `data` and forces `application/json`; a form
/// mapping forces `application/x-www-form-urlencoded`; raw bytes and
/// streams carry no content type of their own.
pub fn resolve_body(data: Option<Data>, json: Option<&Value>) -> Result<ResolvedBody> {
    let mut resolved = match data {
        None => ResolvedBody::default(),
        Some(Data::Form(pairs)) => ResolvedBody {
            bytes: encode_form(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            content_type: Some(FORM_CONTENT_TYPE),
        },
        Some(Data::Reader(mut reader)) => {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            ResolvedBody {
                bytes: Bytes::from(buf),
                content_type: None,
            }
        }
        Some(Data::Bytes(bytes)) => ResolvedBody {
            bytes,
            content_type: None,
        },
        Some(Data::Value(Value::Object(map))) => {
            let pairs: Vec<(String, String)> =
                map.iter().map(|(k, v)| (k.clone(), param_text(v))).collect();
            ResolvedBody {
                bytes: encode_form(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
                content_type: Some(FORM_CONTENT_TYPE),
            }
        }
        Some(Data::Value(other)) => {
            return Err(Error::invalid_body(format!(
                "data must be a mapping, byte stream or bytes, got {}",
                value_kind(&other)
            )));
        }
    };

    if let Some(json) = json {
        resolved = ResolvedBody {
            bytes: Bytes::from(serde_json::to_vec(json)?),
            content_type: Some(JSON_CONTENT_TYPE),
        };
    }

    Ok(resolved)
}

fn encode_form<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Bytes {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.extend_pairs(pairs);
    Bytes::from(serializer.finish())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
