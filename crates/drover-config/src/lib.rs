//! Configuration system for the Drover execution core.
//!
//! Provides TOML-based configuration with:
//! - Attempt submission limits injected into the attempt manager
//! - Exactly-once guard and polling backoff settings
//! - Default secret access prefixes
//! - Config file layering (XDG user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigLayer, ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
