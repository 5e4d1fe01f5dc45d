//! Launcher settings
//!
//! A launcher maps a file extension to the command that runs such files,
//! e.g. `py: "python3 %.py"`. The `%` placeholder stands for the program path
//! without its extension.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings file looked up next to the configuration file
pub const SETTINGS_FILE_NAME: &str = "psweep-settings.yml";

/// Placeholder replaced by the extension-stripped program path
pub const PLACEHOLDER: char = '%';

/// On-disk settings document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Extension (without the dot) -> launcher template
    #[serde(default)]
    pub launchers: BTreeMap<String, String>,
}

/// Extension -> launcher template lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Launchers {
    map: BTreeMap<String, String>,
}

impl Launchers {
    /// A launcher map without any entries
    pub fn empty() -> Self {
        Launchers {
            map: BTreeMap::new(),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, extension: &str, template: &str) -> Self {
        self.insert(extension, template);
        self
    }

    /// Register a launcher; a leading dot on the extension is ignored
    pub fn insert(&mut self, extension: &str, template: &str) {
        self.map.insert(normalize(extension), template.to_string());
    }

    /// Get the launcher template for an extension
    pub fn get(&self, extension: &str) -> Option<&str> {
        self.map.get(&normalize(extension)).map(String::as_str)
    }

    /// Merge another map over this one
    pub fn merge(&mut self, other: Launchers) {
        self.map.extend(other.map);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for Launchers {
    /// Built-in launchers for scripts commonly used in parameter studies
    fn default() -> Self {
        Launchers::empty()
            .with("py", "python3 %.py")
            .with("sh", "sh %.sh")
    }
}

impl From<Settings> for Launchers {
    fn from(settings: Settings) -> Self {
        let mut launchers = Launchers::empty();
        for (ext, template) in &settings.launchers {
            launchers.insert(ext, template);
        }
        launchers
    }
}

fn normalize(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

/// Parse a settings document
pub fn parse_settings(text: &str) -> Result<Settings, serde_yaml::Error> {
    serde_yaml::from_str(text)
}

/// Load a settings file
pub fn load_settings_file(path: &Path) -> ConfigResult<Settings> {
    let settings_error = |error: String| ConfigError::Settings {
        path: path.to_path_buf(),
        error,
    };

    let text = fs::read_to_string(path).map_err(|e| settings_error(e.to_string()))?;
    parse_settings(&text).map_err(|e| settings_error(e.to_string()))
}

/// User-level settings file location, if the platform has one
pub fn user_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "psweep").map(|dirs| dirs.config_dir().join("settings.yml"))
}

/// Resolve the launcher map used for a run
///
/// Lookup order: an explicit settings file, a settings file next to the
/// configuration, the user settings file. The first one found is merged over
/// the built-in defaults.
pub fn load_launchers(explicit: Option<&Path>, config_dir: Option<&Path>) -> ConfigResult<Launchers> {
    let mut launchers = Launchers::default();

    let candidate = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => config_dir
            .map(|dir| dir.join(SETTINGS_FILE_NAME))
            .filter(|p| p.is_file())
            .or_else(|| user_settings_path().filter(|p| p.is_file())),
    };

    if let Some(path) = candidate {
        debug!(path = %path.display(), "loading launcher settings");
        launchers.merge(load_settings_file(&path)?.into());
    }

    Ok(launchers)
}
