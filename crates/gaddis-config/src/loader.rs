//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::settings::{validate_log_level, ConfigFile, GaddisConfig};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "gaddis.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Built-in defaults - lowest priority
/// 2. Global config (`<config dir>/gaddis/config.toml`)
/// 3. Project config (`./gaddis.toml`) - overrides global
/// 4. Environment variables (`GADDIS_*`) - overrides project
/// 5. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Resolved settings
    pub settings: GaddisConfig,

    /// Directory where gaddis.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Create a loader that reads the global config from an explicit path
    pub fn with_global_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find gaddis.toml, layering it over the
    /// global config, then applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let mut settings = GaddisConfig::default();
        settings.apply(&self.load_global_config()?);

        let (project_root, project_file) = find_project_config(start_dir)?;
        settings.apply(&project_file);

        apply_env_overrides(&mut settings)?;
        settings.validate()?;

        Ok(Config {
            settings,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let mut settings = GaddisConfig::default();
        settings.apply(&self.load_global_config()?);
        settings.apply(&ConfigFile::load_from_file(config_path)?);

        apply_env_overrides(&mut settings)?;
        settings.validate()?;

        Ok(Config {
            settings,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Load global configuration, treating a missing file as empty
    fn load_global_config(&mut self) -> ConfigResult<ConfigFile> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = global_config_path()?;
                self.global_config_path = Some(path.clone());
                path
            }
        };

        if !path.exists() {
            return Ok(ConfigFile::default());
        }
        ConfigFile::load_from_file(&path)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the global config file path (`<config dir>/gaddis/config.toml`)
pub fn global_config_path() -> ConfigResult<PathBuf> {
    let dir = dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
    Ok(dir.join("gaddis").join("config.toml"))
}

/// Find project configuration by walking up the directory tree
fn find_project_config(start_dir: &Path) -> ConfigResult<(Option<PathBuf>, ConfigFile)> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(PROJECT_CONFIG_FILE);
        if config_path.exists() {
            let file = ConfigFile::load_from_file(&config_path)?;
            return Ok((Some(current), file));
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Ok((None, ConfigFile::default())),
        }
    }
}

/// Apply environment variable overrides
///
/// Recognized variables:
/// - `GADDIS_MAX_INSTRUCTIONS`, `GADDIS_MAX_STACK_DEPTH`, `GADDIS_SEED`
/// - `GADDIS_STOP_ON_ENTRY`, `GADDIS_NO_DEBUG`
/// - `GADDIS_LOG_LEVEL`
fn apply_env_overrides(settings: &mut GaddisConfig) -> ConfigResult<()> {
    if let Some(n) = env_number("GADDIS_MAX_INSTRUCTIONS")? {
        settings.vm.max_instructions = n;
    }
    if let Some(n) = env_number("GADDIS_MAX_STACK_DEPTH")? {
        settings.vm.max_stack_depth = n;
    }
    if let Some(n) = env_number("GADDIS_SEED")? {
        settings.vm.seed = Some(n);
    }
    if let Ok(value) = env::var("GADDIS_STOP_ON_ENTRY") {
        settings.debug.stop_on_entry = parse_bool(&value);
    }
    if let Ok(value) = env::var("GADDIS_NO_DEBUG") {
        settings.debug.no_debug = parse_bool(&value);
    }
    if let Ok(level) = env::var("GADDIS_LOG_LEVEL") {
        let level = level.to_lowercase();
        validate_log_level("GADDIS_LOG_LEVEL", &level)?;
        settings.log.level = level;
    }
    Ok(())
}

fn env_number<T: FromStr>(name: &str) -> ConfigResult<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: name.to_string(),
                reason: format!("expected a non-negative integer, got '{}'", value),
            }),
        Err(_) => Ok(None),
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}
