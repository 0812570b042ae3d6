//! `${secret:key}` references inside configuration strings.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::resolver::SecretProvider;
use crate::Result;

static SECRET_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{secret:([^}]*)\}").expect("valid regex"));

/// Whether `template` contains at least one secret reference.
pub fn contains_secret_references(template: &str) -> bool {
    SECRET_REF.is_match(template)
}

/// Replace every `${secret:key}` with the secret's value.
///
/// Every reference is required; the first failing lookup aborts rendering.
pub fn render_secret_template(template: &str, secrets: &dyn SecretProvider) -> Result<String> {
    let mut failure = None;
    let rendered = SECRET_REF.replace_all(template, |caps: &Captures<'_>| {
        if failure.is_some() {
            return String::new();
        }
        match secrets.get_secret(caps[1].trim()) {
            Ok(value) => value,
            Err(e) => {
                failure = Some(e);
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(rendered.into_owned()),
    }
}
