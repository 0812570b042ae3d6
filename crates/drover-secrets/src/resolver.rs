//! Secret resolution with operator filtering, user grants and system policy.

use std::sync::Arc;

use tracing::debug;

use crate::grant::{GrantDecision, GrantTree};
use crate::key::SecretKey;
use crate::policy::{SecretAccessContext, SecretAccessPolicy};
use crate::selector::SecretFilter;
use crate::store::{SecretScope, SecretStore};
use crate::{Result, SecretError};

/// Read access to secrets, as handed to a running task.
pub trait SecretProvider: Send + Sync {
    /// Look up `key`; `Ok(None)` when access is granted but no value exists.
    fn get_secret_optional(&self, key: &str) -> Result<Option<String>>;

    /// Look up `key`, failing with [`SecretError::NotFound`] when absent.
    fn get_secret(&self, key: &str) -> Result<String> {
        self.get_secret_optional(key)?
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }
}

/// Resolves secret keys for one task.
///
/// Access is decided in order:
/// 1. keys outside the operator's declared selectors are refused,
/// 2. an explicit user grant allows the key, possibly remounted elsewhere,
/// 3. the system policy may allow it,
/// 4. otherwise access is denied.
///
/// A granted key is fetched from the project scope first and then from the
/// project-default scope.
pub struct SecretResolver {
    context: SecretAccessContext,
    policy: Arc<dyn SecretAccessPolicy>,
    grants: GrantTree,
    filter: SecretFilter,
    store: Arc<dyn SecretStore>,
}

impl SecretResolver {
    pub fn new(
        context: SecretAccessContext,
        policy: Arc<dyn SecretAccessPolicy>,
        grants: GrantTree,
        filter: SecretFilter,
        store: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            context,
            policy,
            grants,
            filter,
            store,
        }
    }

    pub fn context(&self) -> &SecretAccessContext {
        &self.context
    }

    /// Resolve a key, returning `None` when the secret is absent.
    pub fn resolve_optional(&self, key: &str) -> Result<Option<String>> {
        let key = SecretKey::parse(key)?;
        let target = self.authorize(&key)?;
        self.fetch(&target)
    }

    /// Resolve a key that must exist.
    pub fn resolve(&self, key: &str) -> Result<String> {
        self.resolve_optional(key)?
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }

    /// A view whose keys are relative to `prefix`.
    pub fn scoped(&self, prefix: &str) -> Result<ScopedSecrets<'_>> {
        ScopedSecrets::new(self, prefix)
    }

    /// Decide which stored key (if any) `key` may read.
    fn authorize(&self, key: &SecretKey) -> Result<SecretKey> {
        if !self.filter.test(key) {
            debug!(key = %key, operator = %self.context.operator_type, "Secret key outside operator filter");
            return Err(SecretError::AccessFiltered(key.to_string()));
        }

        if let GrantDecision::Granted(target) = self.grants.lookup(key) {
            if target != *key {
                debug!(key = %key, remounted = %target, "Secret key remounted by grant");
            }
            return Ok(target);
        }

        if self.policy.is_accessible(&self.context, key) {
            return Ok(key.clone());
        }

        debug!(key = %key, project_id = %self.context.project_id, "Secret access denied");
        Err(SecretError::AccessDenied(key.to_string()))
    }

    fn fetch(&self, key: &SecretKey) -> Result<Option<String>> {
        let project_id = self.context.project_id;
        if let Some(value) = self
            .store
            .get_secret(project_id, SecretScope::Project, key.as_str())?
        {
            return Ok(Some(value));
        }
        self.store
            .get_secret(project_id, SecretScope::ProjectDefault, key.as_str())
    }
}

impl SecretProvider for SecretResolver {
    fn get_secret_optional(&self, key: &str) -> Result<Option<String>> {
        self.resolve_optional(key)
    }
}

impl std::fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretResolver")
            .field("context", &self.context)
            .field("grants", &self.grants)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Keys relative to a fixed prefix: `password` under `pg` reads `pg.password`.
pub struct ScopedSecrets<'a> {
    parent: &'a dyn SecretProvider,
    prefix: SecretKey,
}

impl<'a> ScopedSecrets<'a> {
    pub fn new(parent: &'a dyn SecretProvider, prefix: &str) -> Result<Self> {
        Ok(Self {
            parent,
            prefix: SecretKey::parse(prefix)?,
        })
    }

    pub fn prefix(&self) -> &SecretKey {
        &self.prefix
    }

    /// Narrow the view further.
    pub fn scoped(&self, prefix: &str) -> Result<ScopedSecrets<'_>> {
        let relative = SecretKey::parse(prefix)?;
        Ok(ScopedSecrets {
            parent: self.parent,
            prefix: self.prefix.join(&relative),
        })
    }
}

impl SecretProvider for ScopedSecrets<'_> {
    fn get_secret_optional(&self, key: &str) -> Result<Option<String>> {
        let relative = SecretKey::parse(key)?;
        self.parent
            .get_secret_optional(self.prefix.join(&relative).as_str())
    }
}
