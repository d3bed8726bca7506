//! Query parameter merging.
//!
//! Parameter values are `serde_json::Value`s so a single mapping can carry
//! strings, numbers, booleans, nested objects and sequences:
//!
//! - strings are sent as-is, numbers in their decimal form
//! - booleans and objects are sent as JSON text (`false`, `{"a":1}`)
//! - sequences expand into repeated `key=value` pairs
//! - `null` is sent as an empty value

use serde_json::Value;
use url::form_urlencoded;

/// Ordered query parameter mapping.
///
/// Inserting an existing key replaces its value in place, so key order is
/// the order of first insertion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Overlay `other` on top of `self`; `other` wins on conflicting keys.
    pub fn extend_from(&mut self, other: &Params) {
        for (key, value) in &other.entries {
            self.insert(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode as an `application/x-www-form-urlencoded` string.
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.entries {
            match value {
                Value::Array(items) => {
                    for item in items {
                        serializer.append_pair(key, &param_text(item));
                    }
                }
                other => {
                    serializer.append_pair(key, &param_text(other));
                }
            }
        }
        serializer.finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Wire text for a single parameter value.
pub(crate) fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Merge `params` into the query component of `url`.
///
/// Existing query parameters are decoded first, then overridden by
/// `params`; the query is re-encoded as a whole. Scheme, authority, path
/// and fragment are left untouched. An empty `params` returns `url`
/// unchanged.
///
/// ```
/// use veneer::params::{merge_url_params, Params};
/// use serde_json::json;
///
/// let params = Params::from([("answers", json!(false)), ("data", json!(["some", "values"]))]);
/// let url = merge_url_params("http://stackoverflow.com/test?answers=true", &params);
/// assert_eq!(url, "http://stackoverflow.com/test?answers=false&data=some&data=values");
/// ```
pub fn merge_url_params(url: &str, params: &Params) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    let (rest, fragment) = match url.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (url, None),
    };
    let (base, query) = rest.split_once('?').unwrap_or((rest, ""));

    let mut merged: Params = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect();
    merged.extend_from(params);

    let query = merged.to_query_string();
    let mut out = String::with_capacity(base.len() + query.len() + 2);
    out.push_str(base);
    if !query.is_empty() {
        out.push('?');
        out.push_str(&query);
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}
