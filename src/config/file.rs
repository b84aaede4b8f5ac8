//! Plugin configuration files.
//!
//! The format is the one ABRT uses for its plugin settings:
//!
//! ```text
//! # comment
//! abrt = on
//! caught = "java.io.IOException, java.lang.IllegalStateException"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{AgentError, Result};

/// Default plugin configuration directories, lowest precedence first.
pub const PLUGIN_CONF_DIRS: [&str; 2] = ["/usr/share/abrt/conf.d/plugins", "/etc/abrt/plugins"];

/// Ordered `key = value` pairs. Setting a key again replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    entries: Vec<(String, String)>,
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Merges `other` into `self`; values from `other` win.
    pub fn extend(&mut self, other: Settings) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parses configuration file text.
///
/// Lines without `=` are skipped with a diagnostic.
pub fn parse_settings(text: &str) -> Settings {
    let mut settings = Settings::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!("ignoring line {} without '=': {line}", number + 1);
            continue;
        };
        settings.insert(key.trim(), unquote(value.trim()));
    }
    settings
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

pub fn read_settings(path: &Path) -> Result<Settings> {
    let text = fs::read_to_string(path).map_err(|source| AgentError::ConfigFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_settings(&text))
}

/// Directories searched for relative configuration file names.
#[derive(Debug, Clone)]
pub struct ConfSearchPath {
    dirs: Vec<PathBuf>,
}

impl ConfSearchPath {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        ConfSearchPath {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Loads `name`.
    ///
    /// Absolute names are read directly. Relative names are read from every
    /// search directory that has them, later directories overriding earlier
    /// ones. Missing files yield empty settings.
    pub fn load(&self, name: &Path) -> Settings {
        if name.is_absolute() {
            return load_optional(name).unwrap_or_default();
        }

        let mut settings = Settings::new();
        let mut found = false;
        for dir in &self.dirs {
            if let Some(loaded) = load_optional(&dir.join(name)) {
                settings.extend(loaded);
                found = true;
            }
        }
        if !found {
            debug!("configuration file {} not found in plugin directories", name.display());
        }
        settings
    }
}

impl Default for ConfSearchPath {
    fn default() -> Self {
        ConfSearchPath::new(PLUGIN_CONF_DIRS)
    }
}

fn load_optional(path: &Path) -> Option<Settings> {
    match read_settings(path) {
        Ok(settings) => {
            debug!("loaded {} entries from {}", settings.len(), path.display());
            Some(settings)
        }
        Err(AgentError::ConfigFile { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            debug!("configuration file {} does not exist", path.display());
            None
        }
        Err(err) => {
            warn!("{err}");
            None
        }
    }
}
