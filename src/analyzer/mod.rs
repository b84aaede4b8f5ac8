//! Offline analysis of reported Java backtraces.
//!
//! ABRT runs `abrt-action-analyze-java` over each problem directory the agent
//! created. It computes the duplicate hash used to group reports and refuses
//! problems whose frames come from classes loaded over the network, since
//! nobody packaging the application can fix those.

mod parser;

use std::collections::HashSet;
use std::io;
use std::path::Path;

use sha1::{Digest, Sha1};

pub use parser::{parse_backtrace, Backtrace, ExceptionTrace, Frame, ParseError, ThreadTrace};

/// Frames of the crash thread that feed the duplicate hash.
pub const DUPHASH_FRAMES: usize = 3;

/// Result of analyzing one backtrace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub duphash: String,
    /// Class locations that are not local files, first seen first.
    pub remote_locations: Vec<String>,
}

impl Analysis {
    /// ABRT's `uuid` is the duplicate hash.
    pub fn uuid(&self) -> &str {
        &self.duphash
    }

    /// Explanation stored as `not-reportable`, if the problem involves remote code.
    pub fn not_reportable(&self) -> Option<String> {
        if self.remote_locations.is_empty() {
            return None;
        }
        Some(format!(
            "This problem can be caused by a 3rd party code from the jar/class at {}. \
             In order to provide valuable problem reports, ABRT will not allow you to \
             submit this problem. If you still want to participate in solving this \
             problem, please contact the developers directly.",
            self.remote_locations.join(", ")
        ))
    }
}

pub fn analyze(text: &str) -> Result<Analysis, ParseError> {
    let backtrace = parse_backtrace(text)?;
    Ok(Analysis {
        duphash: duphash(&backtrace),
        remote_locations: remote_locations(&backtrace),
    })
}

/// SHA-1 over the crash thread's exception type and its top frames.
pub fn duphash(backtrace: &Backtrace) -> String {
    let mut input = String::new();
    if let Some(thread) = backtrace.crash_thread() {
        input.push_str(&thread.exception.exception_type);
        input.push('\n');
        for frame in thread.exception.frames.iter().take(DUPHASH_FRAMES) {
            input.push_str(&frame.function());
            input.push(' ');
            input.push_str(frame.file_name.as_deref().unwrap_or(""));
            input.push('\n');
        }
    }

    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hasher.finalize().iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Distinct frame locations that point off this machine.
pub fn remote_locations(backtrace: &Backtrace) -> Vec<String> {
    let mut seen = HashSet::new();
    backtrace
        .frames()
        .filter_map(|frame| frame.location.as_deref())
        .filter(|location| is_remote(location))
        .filter(|location| seen.insert(*location))
        .map(str::to_owned)
        .collect()
}

/// Whether a class location refers to something other than a local file.
///
/// `jar:` URLs are judged by the archive they point into. Other URLs are local
/// only with the `file` scheme; plain paths are remote when they do not exist.
pub fn is_remote(location: &str) -> bool {
    let location = match location.strip_prefix("jar:") {
        Some(inner) => inner.split('!').next().unwrap_or(inner),
        None => location,
    };
    if location.starts_with("file:") {
        return false;
    }
    if has_url_scheme(location) {
        return true;
    }
    matches!(std::fs::metadata(Path::new(location)), Err(err) if err.kind() == io::ErrorKind::NotFound)
}

fn has_url_scheme(location: &str) -> bool {
    let Some((scheme, _)) = location.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
