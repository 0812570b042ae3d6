//! System-wide secret access policies.
//!
//! The policy is consulted only after the operator filter admitted a key and
//! no user grant matched it.

use drover_types::ProjectId;

use crate::key::SecretKey;
use crate::Result;

/// Identity of the task asking for a secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretAccessContext {
    pub site_id: i32,
    pub project_id: ProjectId,
    pub revision: Option<String>,
    pub workflow_name: String,
    pub task_name: String,
    pub operator_type: String,
}

impl SecretAccessContext {
    pub fn new(project_id: ProjectId, workflow_name: impl Into<String>, task_name: impl Into<String>) -> Self {
        Self {
            site_id: drover_types::defaults::SITE_ID,
            project_id,
            revision: None,
            workflow_name: workflow_name.into(),
            task_name: task_name.into(),
            operator_type: String::new(),
        }
    }

    pub fn with_operator(mut self, operator_type: impl Into<String>) -> Self {
        self.operator_type = operator_type.into();
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_site_id(mut self, site_id: i32) -> Self {
        self.site_id = site_id;
        self
    }
}

/// Decides access for keys without an explicit user grant.
pub trait SecretAccessPolicy: Send + Sync {
    fn is_accessible(&self, context: &SecretAccessContext, key: &SecretKey) -> bool;
}

/// Grants nothing by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllPolicy;

impl SecretAccessPolicy for DenyAllPolicy {
    fn is_accessible(&self, _context: &SecretAccessContext, _key: &SecretKey) -> bool {
        false
    }
}

/// Grants every key equal to or underneath one of the configured prefixes.
#[derive(Debug, Clone, Default)]
pub struct PrefixAccessPolicy {
    prefixes: Vec<SecretKey>,
}

impl PrefixAccessPolicy {
    pub fn new<I, S>(prefixes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(|p| SecretKey::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { prefixes })
    }

    pub fn prefixes(&self) -> &[SecretKey] {
        &self.prefixes
    }
}

impl SecretAccessPolicy for PrefixAccessPolicy {
    fn is_accessible(&self, _context: &SecretAccessContext, key: &SecretKey) -> bool {
        self.prefixes.iter().any(|p| key.starts_with(p))
    }
}
