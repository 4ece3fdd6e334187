//! Header translation between the callback server and the fetch model.
//!
//! A callback server exposes its inbound headers as a mapping from lowercase
//! name to either a single string or an ordered list of strings (repeated
//! headers such as `set-cookie`). [`translate_headers`] turns that mapping
//! into an [`http::HeaderMap`], appending list values one by one and
//! inserting scalar values, so repeated headers never collapse and scalar
//! headers never duplicate.

use std::collections::BTreeMap;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

/// A single header entry as exposed by the callback server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawHeaderValue {
    /// Header present once.
    Single(String),
    /// Header present several times, in arrival order.
    Multiple(Vec<String>),
}

impl From<&str> for RawHeaderValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

impl From<String> for RawHeaderValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for RawHeaderValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

impl From<Vec<&str>> for RawHeaderValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Multiple(values.into_iter().map(ToOwned::to_owned).collect())
    }
}

/// Inbound header collection keyed by lowercase header name.
///
/// Entries may be present but absent-valued (`None`), mirroring servers that
/// expose declared-but-unset headers. Absent entries are skipped on
/// translation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHeaders {
    entries: BTreeMap<String, Option<RawHeaderValue>>,
}

impl RawHeaders {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of a header, replacing any previous entry.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<RawHeaderValue>) {
        self.entries
            .insert(name.as_ref().to_ascii_lowercase(), Some(value.into()));
    }

    /// Record a header name without a value.
    pub fn insert_absent(&mut self, name: impl AsRef<str>) {
        self.entries.insert(name.as_ref().to_ascii_lowercase(), None);
    }

    /// Add a value to a header, turning a single value into a list.
    pub fn append(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let value = value.into();
        let entry = self
            .entries
            .entry(name.as_ref().to_ascii_lowercase())
            .or_insert(None);
        *entry = Some(match entry.take() {
            None => RawHeaderValue::Single(value),
            Some(RawHeaderValue::Single(first)) => RawHeaderValue::Multiple(vec![first, value]),
            Some(RawHeaderValue::Multiple(mut values)) => {
                values.push(value);
                RawHeaderValue::Multiple(values)
            }
        });
    }

    /// Get the entry for a header name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RawHeaderValue> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .and_then(Option::as_ref)
    }

    /// First value of a header, if any.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            RawHeaderValue::Single(value) => Some(value),
            RawHeaderValue::Multiple(values) => values.first().map(String::as_str),
        }
    }

    /// Remove a header, returning its entry.
    pub fn remove(&mut self, name: &str) -> Option<RawHeaderValue> {
        self.entries.remove(&name.to_ascii_lowercase()).flatten()
    }

    /// Iterate over all entries, absent ones included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&RawHeaderValue>)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_ref()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Group the values of a [`HeaderMap`] by name.
    ///
    /// Names seen once become [`RawHeaderValue::Single`], names seen several
    /// times become [`RawHeaderValue::Multiple`]. Values that are not valid
    /// UTF-8 are decoded lossily.
    #[must_use]
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut raw = Self::new();
        for name in map.keys() {
            let mut values: Vec<String> = map
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect();
            let entry = if values.len() == 1 {
                RawHeaderValue::Single(values.remove(0))
            } else {
                RawHeaderValue::Multiple(values)
            };
            raw.entries.insert(name.as_str().to_owned(), Some(entry));
        }
        raw
    }
}

impl<K, V> FromIterator<(K, V)> for RawHeaders
where
    K: AsRef<str>,
    V: Into<RawHeaderValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut raw = Self::new();
        for (name, value) in iter {
            raw.insert(name, value);
        }
        raw
    }
}

/// Translate a raw header collection into a new [`HeaderMap`].
#[must_use]
pub fn translate_headers(raw: &RawHeaders) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(raw.len());
    translate_headers_into(raw, &mut headers);
    headers
}

/// Translate a raw header collection into an existing [`HeaderMap`].
///
/// List values are appended element by element; scalar values replace any
/// existing value for that name. Absent entries and empty scalar values are
/// skipped, as are names or values that are not valid HTTP.
pub fn translate_headers_into(raw: &RawHeaders, headers: &mut HeaderMap) {
    for (name, value) in raw.iter() {
        let Some(value) = value else {
            continue;
        };
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!(header = name, "skipping header with invalid name");
            continue;
        };

        match value {
            RawHeaderValue::Single(value) => {
                if value.is_empty() {
                    continue;
                }
                if let Some(value) = to_header_value(&header_name, value) {
                    headers.insert(header_name, value);
                }
            }
            RawHeaderValue::Multiple(values) => {
                for value in values {
                    if let Some(value) = to_header_value(&header_name, value) {
                        headers.append(header_name.clone(), value);
                    }
                }
            }
        }
    }
}

fn to_header_value(name: &HeaderName, value: &str) -> Option<HeaderValue> {
    match HeaderValue::from_str(value) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(header = %name, "skipping invalid header value");
            None
        }
    }
}
