//! Facts about the monitored process.
//!
//! Everything here is gathered once at VM init except the environment block,
//! which is read when a report is built.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::debug;

/// Placeholder for a main class that cannot be located.
pub const UNKNOWN_CLASS_NAME: &str = "*unknown*";

/// System properties copied into the `jvm_environment` report element.
pub const JVM_ENVIRONMENT_PROPERTIES: [&str; 16] = [
    "sun.java.command",
    "sun.java.launcher",
    "java.home",
    "java.class.path",
    "java.library.path",
    "sun.boot.class.path",
    "sun.boot.library.path",
    "java.ext.dirs",
    "java.endorsed.dirs",
    "java.vm.version",
    "java.vm.name",
    "java.vm.info",
    "java.vm.vendor",
    "java.vm.specification.name",
    "java.vm.specification.vendor",
    "java.vm.specification.version",
];

const DELETED_SUFFIX: &str = " (deleted)";
const PRELINK_MARKER: &str = ".#prelink#.";
const PRELINK_SUFFIX_LEN: usize = ".#prelink#.XXXXXX".len();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessProperties {
    pub pid: u32,
    pub uid: u32,
    /// Path of the running binary, usually `.../bin/java`.
    pub executable: Option<String>,
    /// Command line with arguments separated by spaces.
    pub command_line: Option<String>,
    /// Location of the main class, or [`UNKNOWN_CLASS_NAME`].
    pub main_class: String,
    /// Pre-formatted `jvm_environment` text.
    pub jvm_environment: String,
}

impl ProcessProperties {
    /// Reads pid, uid, executable and command line of the current process.
    pub fn current(main_class: String, jvm_environment: String) -> Self {
        ProcessProperties {
            pid: std::process::id(),
            uid: current_uid(),
            executable: executable_path(),
            command_line: command_line(),
            main_class,
            jvm_environment,
        }
    }

    /// The `name: value` summary logged at VM init.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        push_property(&mut out, "pid", &self.pid.to_string());
        push_property(&mut out, "executable", self.executable.as_deref().unwrap_or(""));
        push_property(&mut out, "exec_command", self.command_line.as_deref().unwrap_or(""));
        push_property(&mut out, "main_class", &self.main_class);
        out
    }
}

pub fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

/// Target of `/proc/self/exe` with deletion and prelink suffixes removed.
pub fn executable_path() -> Option<String> {
    match fs::read_link("/proc/self/exe") {
        Ok(path) => Some(strip_executable_suffixes(&path.to_string_lossy()).to_owned()),
        Err(err) => {
            debug!("cannot read executable name from /proc/self/exe: {err}");
            None
        }
    }
}

/// Removes a trailing ` (deleted)` and then a prelink temporary suffix.
pub fn strip_executable_suffixes(path: &str) -> &str {
    let path = match path.strip_suffix(DELETED_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    };
    if path.len() > PRELINK_SUFFIX_LEN {
        let cut = path.len() - PRELINK_SUFFIX_LEN;
        if path.is_char_boundary(cut) && path[cut..].starts_with(PRELINK_MARKER) {
            return &path[..cut];
        }
    }
    path
}

pub fn command_line() -> Option<String> {
    read_nul_separated(Path::new("/proc/self/cmdline"), ' ')
}

pub fn environ() -> Option<String> {
    read_nul_separated(Path::new("/proc/self/environ"), '\n')
}

fn read_nul_separated(path: &Path, separator: char) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(join_nul_separated(&bytes, separator)),
        Err(err) => {
            debug!("cannot read {}: {err}", path.display());
            None
        }
    }
}

/// Joins the NUL-terminated items of a `/proc` file with `separator`.
pub fn join_nul_separated(bytes: &[u8], separator: char) -> String {
    let text = String::from_utf8_lossy(bytes);
    let items: Vec<&str> = text.trim_end_matches('\0').split('\0').collect();
    items.join(&separator.to_string())
}

/// Resource name of the main class named by `sun.java.command`.
///
/// `org.example.Main arg1 arg2` becomes `org/example/Main`.
pub fn main_class_internal_name(java_command: &str) -> Option<String> {
    let first = java_command.split(' ').next().filter(|word| !word.is_empty())?;
    Some(first.replace('.', "/"))
}

/// Turns a class resource path into a file system location.
///
/// `file:/srv/app.jar!/Main.class` becomes `/srv/app.jar`.
pub fn strip_main_class_path(path: &str) -> &str {
    let path = path.strip_prefix("file:").unwrap_or(path);
    match path.find('!') {
        Some(index) => &path[..index],
        None => path,
    }
}

/// Formats `(property, value)` pairs the way `jvm_environment` holds them.
pub fn format_jvm_environment<'a, I>(properties: I) -> String
where
    I: IntoIterator<Item = (&'a str, Option<String>)>,
{
    let mut out = String::new();
    for (name, value) in properties {
        push_property(&mut out, name, value.as_deref().unwrap_or(""));
    }
    out
}

fn push_property(out: &mut String, name: &str, value: &str) {
    let _ = writeln!(out, "{name:<30}: {value}");
}
