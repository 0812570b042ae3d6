//! Validated dotted secret keys.

use std::fmt;
use std::str::FromStr;

use crate::{Result, SecretError};

/// Segment separator in secret keys.
pub const SEPARATOR: char = '.';

/// A dotted secret key such as `pg.password` or `aws.redshift.secret-access-key`.
///
/// Always non-empty, free of `*`, and free of empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretKey(String);

impl SecretKey {
    /// Parse and validate a key.
    pub fn parse(key: &str) -> Result<Self> {
        if key.is_empty() {
            return Err(illegal(key, "key is empty"));
        }
        if key.contains('*') {
            return Err(illegal(key, "wildcards are not allowed"));
        }
        if key.split(SEPARATOR).any(str::is_empty) {
            return Err(illegal(key, "key contains an empty segment"));
        }
        Ok(Self(key.to_string()))
    }

    /// The key as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The dot-separated segments.
    pub fn segments(&self) -> Vec<&str> {
        self.0.split(SEPARATOR).collect()
    }

    /// Append validated segments to this key.
    pub(crate) fn extend(&self, remainder: &[&str]) -> SecretKey {
        let mut joined = self.0.clone();
        for segment in remainder {
            joined.push(SEPARATOR);
            joined.push_str(segment);
        }
        SecretKey(joined)
    }

    /// Resolve `relative` underneath this key.
    pub fn join(&self, relative: &SecretKey) -> SecretKey {
        self.extend(&relative.segments())
    }

    /// Whether this key equals `prefix` or lies underneath it.
    pub fn starts_with(&self, prefix: &SecretKey) -> bool {
        let ours = self.segments();
        let theirs = prefix.segments();
        ours.len() >= theirs.len() && ours.iter().zip(&theirs).all(|(a, b)| a == b)
    }
}

fn illegal(key: &str, reason: &str) -> SecretError {
    SecretError::Validation {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

impl FromStr for SecretKey {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
