//! Ordered, multi-valued header container and header line editing.

use std::fmt;

/// Ordered multi-valued header mapping.
///
/// Lookups are case-insensitive; names keep the casing they were inserted
/// with and serialization follows insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Set `name` to a single value.
    ///
    /// The first existing entry is overwritten where it stands and any
    /// further entries with the same name are dropped; a new name goes last.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => {
                self.entries[idx] = (name, value);
                self.remove_after(idx);
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Add a value without touching existing entries.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Remove every entry for `name`. Returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.entries.len() != before
    }

    /// Overlay `other`: every name present in `other` takes exactly
    /// `other`'s values, placed where the name first appeared in `self`.
    pub fn update(&mut self, other: &Headers) {
        let mut seen: Vec<&str> = Vec::new();
        for (name, _) in &other.entries {
            if seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                continue;
            }
            seen.push(name);

            let values: Vec<(String, String)> = other
                .entries
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case(name))
                .cloned()
                .collect();

            match self.position(name) {
                Some(idx) => {
                    self.remove_after(idx);
                    self.entries.splice(idx..=idx, values);
                }
                None => self.entries.extend(values),
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to `"Name: value"` lines.
    pub fn to_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect()
    }

    /// Parse `"Name: value"` lines. Lines without a colon are skipped.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = lines
            .into_iter()
            .filter_map(|line| {
                let (name, value) = line.as_ref().split_once(':')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { entries }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    fn remove_after(&mut self, idx: usize) {
        let name = self.entries[idx].0.clone();
        let mut i = idx + 1;
        while i < self.entries.len() {
            if self.entries[i].0.eq_ignore_ascii_case(&name) {
                self.entries.remove(i);
            } else {
                i += 1;
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Headers {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.entries {
            write!(f, "{}: {}\r\n", k, v)?;
        }
        Ok(())
    }
}

/// Insert or replace one header line in an already serialized list.
///
/// A line whose name matches `name` case-insensitively (`name:` prefix) is
/// replaced where it stands; otherwise the line is appended.
pub fn update_header_line(lines: &mut Vec<String>, name: &str, value: &str) {
    let line = format!("{}: {}", name, value);
    let existing = lines.iter().position(|l| {
        l.as_bytes().get(name.len()) == Some(&b':')
            && l.as_bytes()[..name.len()].eq_ignore_ascii_case(name.as_bytes())
    });
    match existing {
        Some(idx) => lines[idx] = line,
        None => lines.push(line),
    }
}
