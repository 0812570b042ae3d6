//! User-declared secret grants.
//!
//! A grant document is a nested mapping keyed by key segments:
//!
//! ```toml
//! [pg]
//! db1 = true           # grant pg.db1.* verbatim
//! db2 = "shared.db"    # pg.db2.<rest> resolves as shared.db.<rest>
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::key::SecretKey;
use crate::{Result, SecretError};

/// One node of the grant tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// `true`: the key is granted under its own name.
    Allow,
    /// `false`: no grant; the system policy decides.
    Deny,
    /// A string: the consumed prefix is replaced by this base key.
    Remount(SecretKey),
    /// A nested mapping.
    Node(BTreeMap<String, Grant>),
}

/// Result of walking the grant tree for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantDecision {
    /// Fetch this key (the requested one, or a remounted one).
    Granted(SecretKey),
    /// No explicit grant applies.
    NoGrant,
}

/// The root of a grant document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantTree {
    root: BTreeMap<String, Grant>,
}

impl GrantTree {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a grant document. The root must be an object.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                root: parse_children(map, "")?,
            }),
            Value::Null => Ok(Self::empty()),
            other => Err(invalid("", format!("expected an object, got {}", kind(other)))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Walk the tree segment by segment following `key`.
    pub fn lookup(&self, key: &SecretKey) -> GrantDecision {
        let segments = key.segments();
        let mut scope = &self.root;

        for (i, segment) in segments.iter().enumerate() {
            let Some(node) = scope.get(*segment) else {
                return GrantDecision::NoGrant;
            };
            match node {
                Grant::Node(children) => {
                    if i + 1 >= segments.len() {
                        // key ended on an intermediate node
                        return GrantDecision::NoGrant;
                    }
                    scope = children;
                }
                Grant::Remount(base) => {
                    return GrantDecision::Granted(base.extend(&segments[i + 1..]));
                }
                Grant::Allow => return GrantDecision::Granted(key.clone()),
                Grant::Deny => return GrantDecision::NoGrant,
            }
        }
        GrantDecision::NoGrant
    }
}

fn parse_children(map: &serde_json::Map<String, Value>, path: &str) -> Result<BTreeMap<String, Grant>> {
    map.iter()
        .map(|(segment, value)| {
            let child_path = if path.is_empty() {
                segment.clone()
            } else {
                format!("{path}.{segment}")
            };
            if segment.is_empty() || segment.contains('.') || segment.contains('*') {
                return Err(invalid(&child_path, "grant keys must be single key segments".into()));
            }
            Ok((segment.clone(), parse_grant(value, &child_path)?))
        })
        .collect()
}

fn parse_grant(value: &Value, path: &str) -> Result<Grant> {
    match value {
        Value::Bool(true) => Ok(Grant::Allow),
        Value::Bool(false) => Ok(Grant::Deny),
        Value::String(base) => SecretKey::parse(base)
            .map(Grant::Remount)
            .map_err(|e| invalid(path, format!("invalid remount target: {e}"))),
        Value::Object(children) => Ok(Grant::Node(parse_children(children, path)?)),
        other => Err(invalid(
            path,
            format!("expected a boolean, string or object, got {}", kind(other)),
        )),
    }
}

fn invalid(path: &str, reason: String) -> SecretError {
    SecretError::InvalidGrant {
        path: path.to_string(),
        reason,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl<'de> Deserialize<'de> for GrantTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        GrantTree::from_value(&value).map_err(serde::de::Error::custom)
    }
}
