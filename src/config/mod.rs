//! Agent configuration.
//!
//! Options come from two sources: the `-agentpath:...=<options>` string and a
//! plugin configuration file. The command line is the primary source: every
//! key it mentions is locked and the configuration file cannot change it.
//!
//! ```text
//! -agentpath:/usr/lib/libabrt-java-agent.so=abrt=on,caught=java.io.IOException:java.lang.Error,output=/tmp/java.log
//! ```
//!
//! | key           | values                      |
//! |---------------|-----------------------------|
//! | `abrt`        | `on`, `yes`                 |
//! | `syslog`      | `on`, `yes`                 |
//! | `journald`    | `off`, `no`                 |
//! | `output`      | path, empty disables        |
//! | `caught`      | list of exception classes   |
//! | `executable`  | `mainclass`, `threadclass`  |
//! | `conffile`    | path, empty disables        |
//! | `debugmethod` | list of `class.method`      |

pub mod file;

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};

pub use file::{parse_settings, read_settings, ConfSearchPath, Settings, PLUGIN_CONF_DIRS};

/// Configuration file used unless `conffile` says otherwise.
pub const DEFAULT_CONF_FILE: &str = "java.conf";

bitflags! {
    /// Where problem reports go.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Destinations: u8 {
        const TERMINAL = 1 << 0;
        const ABRT = 1 << 1;
        const SYSLOG = 1 << 2;
        const JOURNALD = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct ConfiguredKeys: u8 {
        const ABRT = 1 << 0;
        const SYSLOG = 1 << 1;
        const JOURNALD = 1 << 2;
        const OUTPUT = 1 << 3;
        const CAUGHT = 1 << 4;
        const EXECUTABLE = 1 << 5;
        const CONFFILE = 1 << 6;
        const DEBUGMETHOD = 1 << 7;
    }
}

/// What a report names as the executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutableSource {
    /// Location of the application's main class.
    #[default]
    MainClass,
    /// Location of the class the failing thread was started from.
    ThreadClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Disabled,
    Path(PathBuf),
}

/// Origin of a `key=value` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSource {
    CommandLine,
    ConfigFile,
}

impl OptionSource {
    /// Separator between list items.
    pub fn list_delimiter(self) -> &'static str {
        match self {
            OptionSource::CommandLine => ":",
            OptionSource::ConfigFile => ", ",
        }
    }

    fn is_primary(self) -> bool {
        self == OptionSource::CommandLine
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub destinations: Destinations,
    pub executable: ExecutableSource,
    pub output: LogOutput,
    /// `None` when configuration file loading is disabled.
    pub config_file: Option<PathBuf>,
    /// Exception classes reported even when caught.
    pub caught_exception_types: Vec<String>,
    /// `class.method` names that enable the verbose decision trace.
    pub debug_methods: Vec<String>,
    configured: ConfiguredKeys,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            destinations: Destinations::JOURNALD,
            executable: ExecutableSource::MainClass,
            output: LogOutput::Disabled,
            config_file: Some(PathBuf::from(DEFAULT_CONF_FILE)),
            caught_exception_types: Vec::new(),
            debug_methods: Vec::new(),
            configured: ConfiguredKeys::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionKey {
    Abrt,
    Syslog,
    Journald,
    Output,
    Caught,
    Executable,
    Conffile,
    DebugMethod,
}

impl OptionKey {
    fn parse(key: &str) -> Option<Self> {
        Some(match key {
            "abrt" => OptionKey::Abrt,
            "syslog" => OptionKey::Syslog,
            "journald" => OptionKey::Journald,
            "output" => OptionKey::Output,
            "caught" => OptionKey::Caught,
            "executable" => OptionKey::Executable,
            "conffile" => OptionKey::Conffile,
            "debugmethod" => OptionKey::DebugMethod,
            _ => return None,
        })
    }

    fn flag(self) -> ConfiguredKeys {
        match self {
            OptionKey::Abrt => ConfiguredKeys::ABRT,
            OptionKey::Syslog => ConfiguredKeys::SYSLOG,
            OptionKey::Journald => ConfiguredKeys::JOURNALD,
            OptionKey::Output => ConfiguredKeys::OUTPUT,
            OptionKey::Caught => ConfiguredKeys::CAUGHT,
            OptionKey::Executable => ConfiguredKeys::EXECUTABLE,
            OptionKey::Conffile => ConfiguredKeys::CONFFILE,
            OptionKey::DebugMethod => ConfiguredKeys::DEBUGMETHOD,
        }
    }
}

fn is_enabling(value: Option<&str>) -> bool {
    value.map_or(false, |v| v.eq_ignore_ascii_case("on") || v.eq_ignore_ascii_case("yes"))
}

fn is_disabling(value: Option<&str>) -> bool {
    value.map_or(false, |v| v.eq_ignore_ascii_case("off") || v.eq_ignore_ascii_case("no"))
}

fn split_list(value: Option<&str>, delimiter: &str) -> Vec<String> {
    match value {
        Some(list) if !list.is_empty() => list.split(delimiter).map(str::to_owned).collect(),
        _ => Vec::new(),
    }
}

impl Configuration {
    /// Builds the effective configuration: command line first, then the
    /// configuration file it selects.
    pub fn load(options: &str, search: &ConfSearchPath) -> Self {
        let mut config = Configuration::default();
        config.parse_command_line(options);
        config.load_config_file(search);
        config
    }

    /// Applies one option.
    ///
    /// Keys already set from the command line are skipped when `source` is the
    /// configuration file. On error the previous value is kept.
    pub fn apply(&mut self, key: &str, value: Option<&str>, source: OptionSource) -> Result<()> {
        let option = OptionKey::parse(key).ok_or_else(|| AgentError::UnknownOption(key.to_owned()))?;
        let flag = option.flag();

        if !source.is_primary() && self.configured.contains(flag) {
            debug!("option '{key}' already set on the command line");
            return Ok(());
        }
        self.configured |= flag;

        match option {
            OptionKey::Abrt => {
                if is_enabling(value) {
                    debug!("enabling error reporting to ABRT");
                    self.destinations |= Destinations::ABRT;
                }
            }
            OptionKey::Syslog => {
                if is_enabling(value) {
                    debug!("enabling error reporting to syslog");
                    self.destinations |= Destinations::SYSLOG;
                }
            }
            OptionKey::Journald => {
                if is_disabling(value) {
                    debug!("disabling error reporting to journald");
                    self.destinations.remove(Destinations::JOURNALD);
                }
            }
            OptionKey::Output => {
                self.output = match value {
                    Some(path) if !path.is_empty() => LogOutput::Path(PathBuf::from(path)),
                    _ => {
                        debug!("disabling output to log file");
                        LogOutput::Disabled
                    }
                };
            }
            OptionKey::Caught => self.caught_exception_types = split_list(value, source.list_delimiter()),
            OptionKey::Executable => {
                self.executable = match value {
                    None | Some("") => {
                        return Err(AgentError::InvalidOption {
                            key: key.to_owned(),
                            reason: "Value cannot be empty",
                        })
                    }
                    Some("threadclass") => ExecutableSource::ThreadClass,
                    Some("mainclass") => ExecutableSource::MainClass,
                    Some(_) => {
                        return Err(AgentError::InvalidOption {
                            key: key.to_owned(),
                            reason: "Unknown value",
                        })
                    }
                };
            }
            OptionKey::Conffile => {
                self.config_file = match value {
                    Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
                    _ => {
                        debug!("disabling configuration file");
                        None
                    }
                };
            }
            OptionKey::DebugMethod => self.debug_methods = split_list(value, source.list_delimiter()),
        }
        Ok(())
    }

    /// Parses `key[=value][,key[=value]]...`.
    ///
    /// Empty items are skipped and keys may repeat; problems are reported as
    /// diagnostics and parsing continues.
    pub fn parse_command_line(&mut self, options: &str) {
        for item in options.split(',').filter(|item| !item.is_empty()) {
            let (key, value) = match item.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (item, None),
            };
            debug!("parsed option '{key}' = '{}'", value.unwrap_or("(None)"));
            if let Err(err) = self.apply(key, value, OptionSource::CommandLine) {
                warn!("{err}");
            }
        }
    }

    /// Applies configuration file settings below the command line.
    pub fn apply_settings(&mut self, settings: &Settings) {
        for (key, value) in settings.iter() {
            if let Err(err) = self.apply(key, Some(value), OptionSource::ConfigFile) {
                warn!("{err}");
            }
        }
    }

    /// Reads the configured file, if any, through `search`.
    pub fn load_config_file(&mut self, search: &ConfSearchPath) {
        let Some(name) = self.config_file.clone() else {
            debug!("configuration file disabled");
            return;
        };
        let settings = search.load(&name);
        self.apply_settings(&settings);
    }

    /// Whether a caught exception of class `type_name` is still reported.
    pub fn reports_caught(&self, type_name: &str) -> bool {
        self.caught_exception_types.iter().any(|t| t == type_name)
    }

    pub fn is_debug_method(&self, qualified_name: &str) -> bool {
        self.debug_methods.iter().any(|m| m == qualified_name)
    }

    pub fn log_path(&self) -> Option<&Path> {
        match &self.output {
            LogOutput::Disabled => None,
            LogOutput::Path(path) => Some(path),
        }
    }
}
