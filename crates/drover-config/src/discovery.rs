//! Locating and layering `drover.toml` files.
//!
//! Two layers are read, the second overriding the first section by section:
//! the user file `config.toml` in the drover config directory, then
//! `drover.toml` in the project directory.

use std::path::{Path, PathBuf};

use crate::{ConfigError, DroverConfig, Result};

const PROJECT_CONFIG_FILE: &str = "drover.toml";

const USER_CONFIG_FILE: &str = "config.toml";

const APP_NAME: &str = "drover";

/// Replaces the platform config directory when set and non-empty.
const CONFIG_DIR_ENV: &str = "DROVER_CONFIG_DIR";

/// Which layer a config file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    User,
    Project,
}

/// One candidate config file and whether it contributed to the result.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub layer: ConfigLayer,
    pub path: PathBuf,
    pub loaded: bool,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: DroverConfig,
    /// Lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Broken layers and weakened guarantees, for the caller to log.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Discover, merge and validate both layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with the user config directory given explicitly.
///
/// `config_dir` overrides both `DROVER_CONFIG_DIR` and the platform default.
/// The merged result is validated before it is returned.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user = config_dir
        .map(|dir| dir.join(USER_CONFIG_FILE))
        .or_else(xdg_config_path)
        .map(|path| (ConfigLayer::User, path));
    let project = (
        ConfigLayer::Project,
        project_dir.map_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE), |dir| dir.join(PROJECT_CONFIG_FILE)),
    );

    let mut config = DroverConfig::new();
    let mut warnings = Vec::new();
    let sources = user
        .into_iter()
        .chain(std::iter::once(project))
        .map(|(layer, path)| load_layer(&mut config, layer, path, &mut warnings))
        .collect();

    config.validate()?;
    check_guarantees(&config, &mut warnings);

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Parse a single file, without discovery or validation.
pub fn load_config_file(path: &Path) -> Result<DroverConfig> {
    match std::fs::read_to_string(path) {
        Ok(text) => DroverConfig::from_toml(&text),
        Err(source) => Err(ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Write `config` as TOML, creating missing parent directories.
pub fn save_config(config: &DroverConfig, path: &Path) -> Result<()> {
    let write_error = |at: &Path, source| ConfigError::WriteFile {
        path: at.display().to_string(),
        source,
    };
    let text = config.to_toml()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| write_error(parent, e))?;
    }
    std::fs::write(path, text).map_err(|e| write_error(path, e))
}

/// `config.toml` inside [`xdg_config_dir`].
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// `$DROVER_CONFIG_DIR`, or `drover/` under the platform config directory.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Merge one layer into `config`. A missing file is skipped silently; a
/// broken one becomes a warning and the remaining layers still apply.
fn load_layer(
    config: &mut DroverConfig,
    layer: ConfigLayer,
    path: PathBuf,
    warnings: &mut Vec<String>,
) -> ConfigSource {
    let loaded = path.is_file()
        && match load_config_file(&path) {
            Ok(parsed) => {
                config.merge(parsed);
                true
            }
            Err(e) => {
                warnings.push(format!("Skipped {layer:?} config {}: {e}", path.display()));
                false
            }
        };
    ConfigSource { layer, path, loaded }
}

/// Warn when a setting weakens the exactly-once guarantee.
fn check_guarantees(config: &DroverConfig, warnings: &mut Vec<String>) {
    if !config.guard().strict {
        warnings.push(
            "[guard] strict = false: protected statements run on every retry \
             and are not guarded against duplicate execution."
                .to_string(),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
