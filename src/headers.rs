//! Read-only, case-insensitive header multimap shared by requests and responses.

use crate::error::CallError;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;

/// Header multimap: one name maps to an ordered list of values.
///
/// Lookups are case-insensitive per RFC 7230. There is no mutation API; a `Headers`
/// value is built once and then only read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    map: HeaderMap,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, value)` pairs, keeping the order of repeated names.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Validation`] for a name or value that is not legal in HTTP.
    pub fn try_from_pairs<I, K, V>(pairs: I) -> Result<Self, CallError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            let name = HeaderName::from_bytes(name.as_ref().as_bytes()).map_err(|e| {
                CallError::validation("header", format!("'{}': {}", name.as_ref(), e))
            })?;
            let value = HeaderValue::from_str(value.as_ref()).map_err(|e| {
                CallError::validation("header", format!("value of '{}': {}", name, e))
            })?;
            map.append(name, value);
        }
        Ok(Self { map })
    }

    /// First value of `name`, if present and valid UTF-8.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.map.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of `name` in insertion order.
    #[must_use]
    pub fn all(&self, name: &str) -> Vec<&str> {
        self.map
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.keys_len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate `(name, value)` pairs; names are lower-case.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str(), v)))
    }

    #[must_use]
    pub fn as_map(&self) -> &HeaderMap {
        &self.map
    }

    /// Copy into a plain `name -> values` map.
    #[must_use]
    pub fn to_multimap(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in self.iter() {
            out.entry(name.to_string())
                .or_default()
                .push(value.to_string());
        }
        out
    }
}

impl From<HeaderMap> for Headers {
    fn from(map: HeaderMap) -> Self {
        Self { map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let headers = Headers::try_from_pairs([("Content-Type", "text/plain")]).unwrap();
        assert_eq!(headers.first("content-type"), Some("text/plain"));
        assert_eq!(headers.first("CONTENT-TYPE"), Some("text/plain"));
        assert!(headers.contains("Content-type"));
    }

    #[test]
    fn test_repeated_names_keep_order() {
        let headers =
            Headers::try_from_pairs([("Accept", "a"), ("X-Other", "x"), ("accept", "b")]).unwrap();
        assert_eq!(headers.all("accept"), vec!["a", "b"]);
        assert_eq!(headers.len(), 2);
        assert_eq!(
            headers.to_multimap().get("accept"),
            Some(&vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_invalid_name_is_validation_error() {
        let err = Headers::try_from_pairs([("bad name", "v")]).unwrap_err();
        assert!(matches!(err, CallError::Validation { field: "header", .. }));
    }

    #[test]
    fn test_invalid_value_is_validation_error() {
        let err = Headers::try_from_pairs([("X-Test", "line\nbreak")]).unwrap_err();
        assert!(matches!(err, CallError::Validation { field: "header", .. }));
    }
}
