//! Operator-declared secret selectors.
//!
//! Each operator type advertises the keys it may touch, e.g. `pg.*` for a
//! Postgres operator or `aws.*` for a load operator. Any key outside the
//! declared selectors is refused before user grants are even consulted.

use std::fmt;

use crate::key::{SEPARATOR, SecretKey};
use crate::{Result, SecretError};

const WILDCARD: &str = "*";

/// One dotted selector pattern.
///
/// A `*` segment matches exactly one key segment, except in the last position
/// where it matches one or more remaining segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSelector(String);

impl SecretSelector {
    /// Parse a selector such as `pg.*`, `aws.*.region` or `*`.
    pub fn parse(selector: &str) -> Result<Self> {
        if selector.is_empty() || selector.split(SEPARATOR).any(str::is_empty) {
            return Err(SecretError::Validation {
                key: selector.to_string(),
                reason: "selector contains an empty segment".to_string(),
            });
        }
        if selector
            .split(SEPARATOR)
            .any(|s| s != WILDCARD && s.contains('*'))
        {
            return Err(SecretError::Validation {
                key: selector.to_string(),
                reason: "'*' must be a whole segment".to_string(),
            });
        }
        Ok(Self(selector.to_string()))
    }

    /// Whether `key` falls under this selector.
    pub fn matches(&self, key: &SecretKey) -> bool {
        let pattern: Vec<&str> = self.0.split(SEPARATOR).collect();
        let segments = key.segments();

        for (i, p) in pattern.iter().enumerate() {
            let last = i + 1 == pattern.len();
            match segments.get(i) {
                None => return false,
                Some(_) if *p == WILDCARD && last => return true,
                Some(_) if *p == WILDCARD => continue,
                Some(s) if s == p => continue,
                Some(_) => return false,
            }
        }
        segments.len() == pattern.len()
    }
}

impl fmt::Display for SecretSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The set of selectors an operator declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretFilter {
    selectors: Vec<SecretSelector>,
}

impl SecretFilter {
    /// Build a filter from selector strings.
    pub fn of<I, S>(selectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let selectors = selectors
            .into_iter()
            .map(|s| SecretSelector::parse(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { selectors })
    }

    /// A filter that refuses every key (operators that need no secrets).
    pub fn none() -> Self {
        Self::default()
    }

    /// A filter that admits every key.
    pub fn all() -> Self {
        Self {
            selectors: vec![SecretSelector(WILDCARD.to_string())],
        }
    }

    pub fn test(&self, key: &SecretKey) -> bool {
        self.selectors.iter().any(|s| s.matches(key))
    }

    pub fn selectors(&self) -> &[SecretSelector] {
        &self.selectors
    }
}
