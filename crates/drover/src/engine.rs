use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use drover_config::{DroverConfig, LoadedConfig};
use drover_guard::{GuardedStatement, TargetConnector};
use drover_secrets::{GrantTree, PrefixAccessPolicy, SecretAccessContext, SecretFilter, SecretResolver, SecretStore};
use drover_session::{AttemptManager, SqliteSessionStore};
use drover_task::{MemoryStateStore, PollingBackoff, TaskRunner, TaskStateStore};

use crate::Result;

/// State key the polling interval is stored under.
pub const POLL_INTERVAL_KEY: &str = "poll_interval";

/// Components of the execution core built from one configuration.
pub struct Drover {
    config: DroverConfig,
    attempts: AttemptManager<SqliteSessionStore>,
    runner: TaskRunner,
    access_policy: Arc<PrefixAccessPolicy>,
}

impl Drover {
    /// Discover configuration layers and open the engine.
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let loaded = drover_config::load_config(project_dir)?;
        Self::from_loaded(loaded)
    }

    pub fn from_loaded(loaded: LoadedConfig) -> Result<Self> {
        for warning in &loaded.warnings {
            warn!("{warning}");
        }
        for path in loaded.loaded_from() {
            info!(path = %path.display(), "Loaded config");
        }
        Self::open(loaded.config)
    }

    /// Open with task state held in memory.
    pub fn open(config: DroverConfig) -> Result<Self> {
        Self::with_state_store(config, Arc::new(MemoryStateStore::new()))
    }

    pub fn with_state_store(config: DroverConfig, state_store: Arc<dyn TaskStateStore>) -> Result<Self> {
        config.validate()?;

        let store = match config.database.as_ref().and_then(|d| d.path.as_deref()) {
            Some(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent)?;
                }
                info!(path = %path.display(), "Opening session store");
                SqliteSessionStore::open(path)?
            }
            None => {
                info!("Opening in-memory session store");
                SqliteSessionStore::open_in_memory()?
            }
        };

        let task = config.task();
        let runner = TaskRunner::new(state_store)
            .with_round_timeout(non_zero(task.round_timeout_secs).map(Duration::from_secs))
            .with_max_rounds(non_zero(task.max_rounds));

        let access_policy = Arc::new(PrefixAccessPolicy::new(&config.secrets().default_access)?);

        Ok(Self {
            attempts: AttemptManager::new(Arc::new(store), config.attempts()),
            runner,
            access_policy,
            config,
        })
    }

    pub fn config(&self) -> &DroverConfig {
        &self.config
    }

    pub fn attempts(&self) -> &AttemptManager<SqliteSessionStore> {
        &self.attempts
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Polling backoff with the configured bounds.
    pub fn backoff(&self) -> PollingBackoff {
        let backoff = self.config.backoff();
        PollingBackoff::new(
            POLL_INTERVAL_KEY,
            Duration::from_secs(backoff.initial_interval_secs),
            Duration::from_secs(backoff.max_interval_secs),
        )
    }

    /// Secret resolver for one task, with the configured default access
    /// as its system policy.
    pub fn secret_resolver(
        &self,
        context: SecretAccessContext,
        grants: GrantTree,
        filter: SecretFilter,
        store: Arc<dyn SecretStore>,
    ) -> SecretResolver {
        let context = context.with_site_id(self.attempts.site_id());
        SecretResolver::new(context, self.access_policy.clone(), grants, filter, store)
    }

    /// Guarded statement task against `connector`. Connects once to choose
    /// the guard mode.
    pub fn guarded_statement(&self, connector: Arc<dyn TargetConnector>) -> Result<GuardedStatement> {
        Ok(GuardedStatement::new(connector, &self.config.guard(), self.backoff())?)
    }
}

fn non_zero<T: Default + PartialEq>(value: T) -> Option<T> {
    (value != T::default()).then_some(value)
}
