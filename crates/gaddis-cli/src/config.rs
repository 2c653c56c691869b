//! CLI configuration
//!
//! Layered settings come from `gaddis-config`; the CLI adds a couple of
//! environment-only knobs for the debugger's line editor.

use anyhow::{Context, Result};
use gaddis_config::{ConfigLoader, GaddisConfig};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    pub settings: GaddisConfig,
    /// Directory holding the gaddis.toml in effect, if any
    pub project_root: Option<PathBuf>,
    /// Custom history file path (GADDIS_HISTORY_FILE=/path/to/file)
    pub history_file: Option<PathBuf>,
    /// Disable history by default (GADDIS_NO_HISTORY=1)
    pub no_history: bool,
}

impl Config {
    /// Load settings for a run started in `cwd`.
    ///
    /// An explicit config file replaces the upward search for gaddis.toml.
    pub fn load(cwd: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut loader = ConfigLoader::new();
        let loaded = match explicit {
            Some(path) => loader
                .load_from_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?,
            None => loader
                .load_from_directory(cwd)
                .context("Failed to load configuration")?,
        };
        Ok(Self {
            settings: loaded.settings,
            project_root: loaded.project_root,
            history_file: env::var("GADDIS_HISTORY_FILE").ok().map(PathBuf::from),
            no_history: env::var("GADDIS_NO_HISTORY").is_ok(),
        })
    }

    /// Get the history file path
    ///
    /// Returns:
    /// 1. GADDIS_HISTORY_FILE if set
    /// 2. ~/.gaddis/debug_history if home directory exists
    /// 3. None otherwise
    pub fn history_path(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.history_file {
            return Some(path.clone());
        }
        dirs::home_dir().map(|home| home.join(".gaddis").join("debug_history"))
    }
}
