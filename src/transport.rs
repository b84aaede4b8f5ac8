//! Report transports: abrtd, journald, syslog and the terminal.

use std::ffi::CString;
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::raw::c_char;
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::report::{ProblemReport, ReportSink};

pub const ABRT_SOCKET_PATH: &str = "/var/run/abrt/abrt.socket";
pub const JOURNALD_SOCKET_PATH: &str = "/run/systemd/journal/socket";

/// Identifier used for syslog and journald entries.
pub const SYSLOG_IDENTIFIER: &str = "abrt-java-connector";

const ABRT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// The abrtd problem-creation socket.
#[derive(Debug, Clone)]
pub struct AbrtSocket {
    path: PathBuf,
}

impl AbrtSocket {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AbrtSocket { path: path.into() }
    }
}

impl Default for AbrtSocket {
    fn default() -> Self {
        AbrtSocket::new(ABRT_SOCKET_PATH)
    }
}

/// Request body understood by abrtd: a bare POST followed by `key=value\0` items.
pub fn abrt_request(report: &ProblemReport) -> Vec<u8> {
    let mut request = b"POST / HTTP/1.1\r\n\r\n".to_vec();
    for (key, value) in report.items() {
        request.extend_from_slice(key.as_bytes());
        request.push(b'=');
        request.extend_from_slice(value.as_bytes());
        request.push(0);
    }
    request
}

impl ReportSink for AbrtSocket {
    fn submit(&self, report: &ProblemReport) -> Result<()> {
        let mut stream = UnixStream::connect(&self.path)?;
        stream.set_read_timeout(Some(ABRT_RESPONSE_TIMEOUT))?;
        stream.write_all(&abrt_request(report))?;
        stream.shutdown(Shutdown::Write)?;

        let mut response = String::new();
        stream.read_to_string(&mut response)?;
        let status = response.lines().next().unwrap_or("").trim();
        if status.starts_with("HTTP/1.1 201") {
            Ok(())
        } else {
            Err(AgentError::Rejected {
                destination: "abrt",
                reason: status.to_owned(),
            })
        }
    }
}

/// The systemd journal, spoken to in its native datagram protocol.
#[derive(Debug, Clone)]
pub struct Journald {
    path: PathBuf,
}

impl Journald {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Journald { path: path.into() }
    }
}

impl Default for Journald {
    fn default() -> Self {
        Journald::new(JOURNALD_SOCKET_PATH)
    }
}

/// Encodes journal fields; values containing a newline are length-prefixed.
pub fn journal_payload<'a, I>(fields: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut payload = Vec::new();
    for (name, value) in fields {
        payload.extend_from_slice(name.as_bytes());
        if value.contains('\n') {
            payload.push(b'\n');
            payload.extend_from_slice(&(value.len() as u64).to_le_bytes());
            payload.extend_from_slice(value.as_bytes());
        } else {
            payload.push(b'=');
            payload.extend_from_slice(value.as_bytes());
        }
        payload.push(b'\n');
    }
    payload
}

/// Journal fields describing `report`.
pub fn journal_fields(report: &ProblemReport) -> Vec<(&str, &str)> {
    vec![
        ("MESSAGE", report.reason()),
        ("PRIORITY", "3"),
        ("SYSLOG_IDENTIFIER", SYSLOG_IDENTIFIER),
        ("JAVA_EXECUTABLE", report.get("executable").unwrap_or("")),
        ("STACK_TRACE", report.backtrace()),
    ]
}

impl ReportSink for Journald {
    fn submit(&self, report: &ProblemReport) -> Result<()> {
        let socket = UnixDatagram::unbound()?;
        socket.send_to(&journal_payload(journal_fields(report)), &self.path)?;
        Ok(())
    }
}

/// The local syslog daemon, one `LOG_ERR` entry per report line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Syslog;

static SYSLOG_OPENED: Once = Once::new();

// openlog keeps the pointer, so the identifier must live forever.
static SYSLOG_IDENT: &[u8] = b"abrt-java-connector\0";
static SYSLOG_FORMAT: &[u8] = b"%s\0";

impl Syslog {
    pub fn new() -> Self {
        Syslog
    }

    fn open(&self) {
        SYSLOG_OPENED.call_once(|| {
            // SAFETY: the identifier is a NUL-terminated static.
            unsafe {
                libc::openlog(
                    SYSLOG_IDENT.as_ptr() as *const c_char,
                    libc::LOG_CONS | libc::LOG_PID,
                    libc::LOG_USER,
                )
            };
        });
    }

    fn log(&self, line: &str) {
        // Interior NULs cannot be passed through; drop them.
        let Ok(line) = CString::new(line.replace('\0', "")) else {
            return;
        };
        // SAFETY: both the format and the argument are NUL-terminated.
        unsafe {
            libc::syslog(libc::LOG_ERR, SYSLOG_FORMAT.as_ptr() as *const c_char, line.as_ptr());
        }
    }
}

impl ReportSink for Syslog {
    fn submit(&self, report: &ProblemReport) -> Result<()> {
        self.open();
        self.log(report.reason());
        for line in report.backtrace().lines() {
            self.log(line);
        }
        Ok(())
    }
}

/// Standard error of the monitored process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Terminal;

impl ReportSink for Terminal {
    fn submit(&self, report: &ProblemReport) -> Result<()> {
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        writeln!(out, "{}", report.reason())?;
        out.write_all(report.backtrace().as_bytes())?;
        if !report.backtrace().ends_with('\n') {
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}
