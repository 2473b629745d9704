use crate::errors::{ErrorKind, YcsbError, YcsbResult};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

/// String-valued configuration bag handed to a binding at construction.
///
/// Bindings read their options from it with [`Properties::get_or`] and
/// [`Properties::parse_or`]. Loading properties from files or the command
/// line is the harness's job; this type only stores and converts values.
///
/// # Examples
///
/// ```rust,ignore
/// use ycsb::Properties;
///
/// let props = Properties::new()
///     .with("mongodb.url", "localhost:27017")
///     .with("batchsize", "100");
/// let batch: usize = props.parse_or("batchsize", 1)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Properties {
        Properties {
            values: HashMap::new(),
        }
    }

    /// Sets `key` to `value` and returns `self` for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets `key` to `value`, returning the previous value if any.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the value of `key`, or `default` when the key is absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parses the value of `key`, falling back to `default` when the key is
    /// absent. A present but unparsable value is an
    /// [`ErrorKind::InvalidConfiguration`] error; it is never silently
    /// replaced by the default.
    pub fn parse_or<T>(&self, key: &str, default: T) -> YcsbResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|err| {
                YcsbError::new(
                    &format!("Invalid value for '{}': '{}' ({})", key, raw, err),
                    ErrorKind::InvalidConfiguration,
                )
            }),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Properties::new();
        props.extend(iter);
        props
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Properties {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_falls_back_to_default() {
        let props = Properties::new().with("mongodb.database", "bench");
        assert_eq!(props.get_or("mongodb.database", "ycsb"), "bench");
        assert_eq!(props.get_or("mongodb.url", "localhost:27017"), "localhost:27017");
    }

    #[test]
    fn test_parse_or_parses_present_value() {
        let props = Properties::new().with("batchsize", " 25 ");
        let batch: usize = props.parse_or("batchsize", 1).unwrap();
        assert_eq!(batch, 25);
    }

    #[test]
    fn test_parse_or_uses_default_when_absent() {
        let props = Properties::new();
        let compressibility: f64 = props.parse_or("compressibility", 1.0).unwrap();
        assert_eq!(compressibility, 1.0);
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        let props = Properties::new().with("threadcount", "many");
        let err = props.parse_or::<u32>("threadcount", 100).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidConfiguration);
        assert!(err.message().contains("threadcount"));
        assert!(err.message().contains("many"));
    }

    #[test]
    fn test_set_returns_previous_value() {
        let mut props = Properties::new();
        assert_eq!(props.set("batchsize", "1"), None);
        assert_eq!(props.set("batchsize", "10"), Some("1".to_string()));
        assert_eq!(props.get("batchsize"), Some("10"));
    }

    #[test]
    fn test_from_iterator_and_remove() {
        let mut props: Properties = vec![("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(props.len(), 2);
        assert!(props.contains("a"));
        assert_eq!(props.remove("a"), Some("1".to_string()));
        assert!(!props.contains("a"));
        assert!(!props.is_empty());
        assert_eq!(props.iter().count(), 1);
    }
}
