//! Problem reports and where they go.

use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::config::{Configuration, Destinations, LogOutput};
use crate::error::{AgentError, Result};
use crate::process::{self, ProcessProperties};
use crate::transport::{AbrtSocket, Journald, Syslog, Terminal};

/// Value of both the `type` and `analyzer` elements.
pub const PROBLEM_TYPE: &str = "Java";

/// An ordered set of named text elements describing one problem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProblemReport {
    items: Vec<(String, String)>,
}

impl ProblemReport {
    /// Builds a report with the required elements.
    ///
    /// The reason reads `<message> in method <method>`.
    pub fn new(executable: &str, message: &str, method: &str, backtrace: &str) -> Self {
        let mut report = ProblemReport::default();
        report.add("type", PROBLEM_TYPE);
        report.add("analyzer", PROBLEM_TYPE);
        report.add("uid", process::current_uid().to_string());
        report.add("executable", executable);
        report.add("backtrace", backtrace);
        report.add("reason", format!("{message} in method {method}"));
        report
    }

    /// Sets `key`, replacing an earlier value.
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.items.iter_mut().find(|(k, _)| k == key) {
            Some(item) => item.1 = value,
            None => self.items.push((key.to_owned(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Adds the optional process elements.
    ///
    /// The process binary goes to `executable` unless that is already set,
    /// in which case it goes to `java_executable`.
    pub fn add_process_data(&mut self, properties: &ProcessProperties, environ: Option<String>) {
        self.add("jvm_environment", properties.jvm_environment.clone());
        self.add("environ", environ.unwrap_or_default());
        self.add("pid", properties.pid.to_string());
        self.add("cmdline", properties.command_line.clone().unwrap_or_default());
        let binary = properties.executable.clone().unwrap_or_default();
        if self.contains("executable") {
            self.add("java_executable", binary);
        } else {
            self.add("executable", binary);
        }
    }

    pub fn reason(&self) -> &str {
        self.get("reason").unwrap_or("")
    }

    pub fn backtrace(&self) -> &str {
        self.get("backtrace").unwrap_or("")
    }
}

/// Something that accepts problem reports.
pub trait ReportSink: Send + Sync {
    fn submit(&self, report: &ProblemReport) -> Result<()>;
}

impl<S: ReportSink + ?Sized> ReportSink for Box<S> {
    fn submit(&self, report: &ProblemReport) -> Result<()> {
        (**self).submit(report)
    }
}

/// Sends every report to each enabled destination.
///
/// A failing destination does not keep the others from receiving the report;
/// the first failure is returned after all were tried.
pub struct Dispatcher {
    destinations: Vec<(&'static str, Box<dyn ReportSink>)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher { destinations: Vec::new() }
    }

    pub fn with_destination(mut self, name: &'static str, sink: Box<dyn ReportSink>) -> Self {
        self.destinations.push((name, sink));
        self
    }

    /// Destinations selected by `config`, with their default endpoints.
    pub fn from_config(config: &Configuration) -> Self {
        let mut dispatcher = Dispatcher::new();
        let selected = config.destinations;
        if selected.contains(Destinations::TERMINAL) {
            dispatcher = dispatcher.with_destination("terminal", Box::new(Terminal));
        }
        if selected.contains(Destinations::ABRT) {
            dispatcher = dispatcher.with_destination("abrt", Box::new(AbrtSocket::default()));
        }
        if selected.contains(Destinations::SYSLOG) {
            dispatcher = dispatcher.with_destination("syslog", Box::new(Syslog::new()));
        }
        if selected.contains(Destinations::JOURNALD) {
            dispatcher = dispatcher.with_destination("journald", Box::new(Journald::default()));
        }
        dispatcher
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.destinations.iter().map(|(name, _)| *name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::new()
    }
}

impl ReportSink for Dispatcher {
    fn submit(&self, report: &ProblemReport) -> Result<()> {
        if self.destinations.is_empty() {
            debug!("no report destination enabled");
            return Ok(());
        }

        let mut first_error = None;
        for (name, sink) in &self.destinations {
            match sink.submit(report) {
                Ok(()) => info!("problem data sent to {name}"),
                Err(err) => {
                    warn!("cannot send problem data to {name}: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// The optional plain-text event log.
///
/// Writes are serialized by an internal lock that is never held across a
/// call into the VM.
pub struct EventLog {
    writer: Option<Mutex<Box<dyn Write + Send>>>,
}

impl EventLog {
    pub fn disabled() -> Self {
        EventLog { writer: None }
    }

    /// Opens (truncating) the configured file.
    pub fn open(output: &LogOutput) -> Result<Self> {
        match output {
            LogOutput::Disabled => Ok(EventLog::disabled()),
            LogOutput::Path(path) => EventLog::create(path),
        }
    }

    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| AgentError::LogFile {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("path to the log file: {}", path.display());
        Ok(EventLog::from_writer(LineWriter::new(file)))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        EventLog {
            writer: Some(Mutex::new(Box::new(writer))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Appends `text`; a missing trailing newline is added.
    pub fn write(&self, text: &str) {
        let Some(writer) = &self.writer else {
            return;
        };
        let mut writer = writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = writer.write_all(text.as_bytes()).and_then(|()| {
            if text.ends_with('\n') {
                Ok(())
            } else {
                writer.write_all(b"\n")
            }
        });
        if let Err(err) = result.and_then(|()| writer.flush()) {
            warn!("cannot write to the log file: {err}");
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        match &self.writer {
            Some(writer) => writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).flush(),
            None => Ok(()),
        }
    }
}
