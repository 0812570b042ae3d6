//! Secret storage backends.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use drover_types::ProjectId;

use crate::Result;

/// Where a secret was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretScope {
    /// Set by the project's owners.
    Project,
    /// Provisioned as a default for the project by the platform.
    ProjectDefault,
}

impl SecretScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretScope::Project => "project",
            SecretScope::ProjectDefault => "project_default",
        }
    }
}

impl fmt::Display for SecretScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend that holds secret values.
pub trait SecretStore: Send + Sync {
    fn get_secret(&self, project_id: ProjectId, scope: SecretScope, key: &str) -> Result<Option<String>>;
}

/// In-memory secret store.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<(ProjectId, SecretScope, String), String>>,
    lookups: AtomicUsize,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, project_id: ProjectId, scope: SecretScope, key: impl Into<String>, value: impl Into<String>) {
        self.secrets
            .write()
            .insert((project_id, scope, key.into()), value.into());
    }

    /// Builder form of [`put`](Self::put).
    pub fn with(self, project_id: ProjectId, scope: SecretScope, key: &str, value: &str) -> Self {
        self.put(project_id, scope, key, value);
        self
    }

    pub fn delete(&self, project_id: ProjectId, scope: SecretScope, key: &str) -> bool {
        self.secrets
            .write()
            .remove(&(project_id, scope, key.to_string()))
            .is_some()
    }

    /// Number of `get_secret` calls served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl SecretStore for MemorySecretStore {
    fn get_secret(&self, project_id: ProjectId, scope: SecretScope, key: &str) -> Result<Option<String>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .secrets
            .read()
            .get(&(project_id, scope, key.to_string()))
            .cloned())
    }
}
