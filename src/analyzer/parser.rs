//! Java backtrace text parser.
//!
//! Accepts what the agent renders as well as plain `printStackTrace` output:
//!
//! ```text
//! Exception in thread "main" java.lang.RuntimeException: boom
//! 	at com.example.App.run(App.java:12) [file:/opt/app/app.jar]
//! 	at com.example.App.main(App.java:5) [file:/opt/app/app.jar]
//! Caused by: java.io.IOException: disk full
//! 	at com.example.Store.write(Native Method) [unknown]
//! 	... 2 more
//! ```

use thiserror::Error;

use crate::stack_trace::UNKNOWN_LOCATION;

const THREAD_HEADER: &str = "Exception in thread \"";
const CAUSED_BY: &str = "Caused by: ";

/// Why a backtrace could not be parsed. Line numbers start at 1.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("backtrace is empty")]
    Empty,

    #[error("line {line}: malformed thread header")]
    MalformedHeader { line: usize },

    #[error("line {line}: malformed exception '{text}'")]
    MalformedException { line: usize, text: String },

    #[error("line {line}: malformed frame '{text}'")]
    MalformedFrame { line: usize, text: String },

    #[error("line {line}: unexpected '{text}'")]
    UnexpectedLine { line: usize, text: String },
}

/// One `at ...` line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Java 9+ module or loader prefix such as `java.base`.
    pub module: Option<String>,
    pub class_name: String,
    pub method_name: String,
    pub file_name: Option<String>,
    pub line: Option<u32>,
    pub native: bool,
    /// Where the class was loaded from; `None` when unknown.
    pub location: Option<String>,
}

impl Frame {
    /// `class.method`.
    pub fn function(&self) -> String {
        format!("{}.{}", self.class_name, self.method_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExceptionTrace {
    pub exception_type: String,
    pub message: Option<String>,
    pub frames: Vec<Frame>,
    pub cause: Option<Box<ExceptionTrace>>,
}

impl ExceptionTrace {
    /// This exception followed by its causes.
    pub fn chain(&self) -> impl Iterator<Item = &ExceptionTrace> {
        std::iter::successors(Some(self), |exception| exception.cause.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadTrace {
    /// `None` for traces without an `Exception in thread` header.
    pub name: Option<String>,
    pub exception: ExceptionTrace,
}

impl ThreadTrace {
    /// Frames of the exception and all its causes, outermost first.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.exception.chain().flat_map(|exception| exception.frames.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backtrace {
    pub threads: Vec<ThreadTrace>,
}

impl Backtrace {
    /// The thread the problem is attributed to.
    pub fn crash_thread(&self) -> Option<&ThreadTrace> {
        self.threads.first()
    }

    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.threads.iter().flat_map(ThreadTrace::frames)
    }
}

/// A thread whose exception chain is still being read.
struct PendingThread {
    name: Option<String>,
    chain: Vec<ExceptionTrace>,
}

impl PendingThread {
    fn new(name: Option<String>, first: ExceptionTrace) -> Self {
        PendingThread { name, chain: vec![first] }
    }

    // `chain` is never empty.
    fn innermost(&mut self) -> &mut ExceptionTrace {
        let last = self.chain.len() - 1;
        &mut self.chain[last]
    }

    fn finish(self) -> ThreadTrace {
        let exception = self
            .chain
            .into_iter()
            .rev()
            .reduce(|cause, mut outer| {
                outer.cause = Some(Box::new(cause));
                outer
            })
            .unwrap_or_default();
        ThreadTrace { name: self.name, exception }
    }
}

/// Parses a whole backtrace.
pub fn parse_backtrace(text: &str) -> Result<Backtrace, ParseError> {
    let mut threads = Vec::new();
    let mut current: Option<PendingThread> = None;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        if raw.trim().is_empty() {
            continue;
        }

        if let Some(rest) = raw.strip_prefix(THREAD_HEADER) {
            let (name, exception) = rest.split_once("\" ").ok_or(ParseError::MalformedHeader { line })?;
            let exception = parse_exception_line(exception, line)?;
            if let Some(done) = current.replace(PendingThread::new(Some(name.to_owned()), exception)) {
                threads.push(done.finish());
            }
            continue;
        }

        let trimmed = raw.trim_start();
        let Some(thread) = current.as_mut() else {
            // A bare `printStackTrace` starts with the exception itself.
            let exception = parse_exception_line(raw.trim_end(), line)?;
            current = Some(PendingThread::new(None, exception));
            continue;
        };

        if let Some(frame) = trimmed.strip_prefix("at ") {
            let frame = parse_frame(frame.trim_end()).ok_or_else(|| ParseError::MalformedFrame {
                line,
                text: trimmed.to_owned(),
            })?;
            thread.innermost().frames.push(frame);
        } else if let Some(cause) = trimmed.strip_prefix(CAUSED_BY) {
            thread.chain.push(parse_exception_line(cause.trim_end(), line)?);
        } else if trimmed.starts_with("...") && trimmed.trim_end().ends_with("more") {
            // Frames shared with the enclosing trace.
        } else if thread.innermost().frames.is_empty() {
            // Multi-line exception message.
            let innermost = thread.innermost();
            innermost.message = Some(match innermost.message.take() {
                Some(message) => format!("{message}\n{raw}"),
                None => raw.to_owned(),
            });
        } else {
            return Err(ParseError::UnexpectedLine { line, text: raw.to_owned() });
        }
    }

    threads.extend(current.map(PendingThread::finish));
    if threads.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(Backtrace { threads })
}

/// `<type>[: <message>]`.
fn parse_exception_line(text: &str, line: usize) -> Result<ExceptionTrace, ParseError> {
    let (exception_type, message) = match text.split_once(": ") {
        Some((exception_type, message)) => (exception_type, Some(message.to_owned())),
        None => (text.strip_suffix(':').unwrap_or(text), None),
    };
    let malformed = exception_type.is_empty()
        || exception_type.chars().any(char::is_whitespace)
        || exception_type.starts_with('.');
    if malformed {
        return Err(ParseError::MalformedException { line, text: text.to_owned() });
    }
    Ok(ExceptionTrace {
        exception_type: exception_type.to_owned(),
        message,
        ..ExceptionTrace::default()
    })
}

/// `<class>.<method>(<source>) [<location>]`, without the leading `at `.
fn parse_frame(text: &str) -> Option<Frame> {
    let (call, location) = match text.strip_suffix(']').and_then(|rest| rest.rsplit_once(" [")) {
        Some((call, location)) => (call.trim_end(), Some(location)),
        None => (text, None),
    };

    let call = call.strip_suffix(')')?;
    let (function, source) = call.rsplit_once('(')?;
    let (module, function) = match function.rsplit_once('/') {
        Some((module, function)) => (Some(module), function),
        None => (None, function),
    };
    let (class_name, method_name) = function.rsplit_once('.')?;
    if class_name.is_empty() || method_name.is_empty() {
        return None;
    }

    let mut frame = Frame {
        module: module
            .map(|module| module.trim_end_matches('/'))
            .filter(|module| !module.is_empty())
            .map(str::to_owned),
        class_name: class_name.to_owned(),
        method_name: method_name.to_owned(),
        location: location
            .filter(|location| !location.is_empty() && *location != UNKNOWN_LOCATION)
            .map(str::to_owned),
        ..Frame::default()
    };
    match source {
        "Native Method" => frame.native = true,
        "Unknown Source" | "" => {}
        source => match source.rsplit_once(':') {
            Some((file, line)) if line.parse::<u32>().is_ok() => {
                frame.line = line.parse().ok();
                if file != "Unknown Source" {
                    frame.file_name = Some(file.to_owned());
                }
            }
            _ => frame.file_name = Some(source.to_owned()),
        },
    }
    Some(frame)
}
