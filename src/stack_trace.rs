//! Bounded rendering of a Java stack trace.
//!
//! The output mimics `Throwable.printStackTrace()` with each frame annotated
//! by the location of its class:
//!
//! ```text
//! Exception in thread "main" java.lang.RuntimeException: boom
//! 	at Demo.run(Demo.java:10) [file:/srv/demo/Demo.class]
//! 	at Demo.main(Demo.java:3) [file:/srv/demo/Demo.class]
//! Caused by: java.io.IOException: disk
//! 	at Demo.io(Demo.java:20) [unknown]
//! ```
//!
//! Only whole lines are ever emitted: the first line that does not fit ends
//! the output. Rendering is generic over [`ExceptionInspector`] so the VM side
//! lives in [`crate::jvm`].

use tracing::debug;

/// Upper bound for a rendered trace, in bytes.
pub const MAX_STACK_TRACE_LENGTH: usize = 10_000;

/// Placeholder for frames whose class location cannot be determined.
pub const UNKNOWN_LOCATION: &str = "unknown";

/// One rendered stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameText {
    /// `StackTraceElement.toString()`.
    pub description: String,
    /// URL of the class file the frame's class was loaded from.
    pub location: Option<String>,
}

/// Read access to a throwable and its frames.
pub trait ExceptionInspector {
    type Throwable;
    type Trace;

    /// `toString()` of the throwable.
    fn describe(&self, throwable: &Self::Throwable) -> Option<String>;

    fn stack_trace(&self, throwable: &Self::Throwable) -> Option<Self::Trace>;

    fn frame_count(&self, trace: &Self::Trace) -> usize;

    /// Frame at `index`, 0 being the innermost. `None` if it cannot be read.
    fn frame(&self, trace: &Self::Trace, index: usize) -> Option<FrameText>;

    /// `getCause()`, `None` when absent.
    fn cause(&self, throwable: &Self::Throwable) -> Option<Self::Throwable>;
}

/// Accumulates lines up to a fixed byte budget.
#[derive(Debug, Clone)]
pub struct TraceBuffer {
    text: String,
    limit: usize,
}

impl TraceBuffer {
    pub fn new(limit: usize) -> Self {
        TraceBuffer {
            text: String::with_capacity(limit.min(MAX_STACK_TRACE_LENGTH)),
            limit,
        }
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.text.len()
    }

    /// Appends the concatenation of `parts` if all of it fits.
    pub fn try_push(&mut self, parts: &[&str]) -> bool {
        let needed: usize = parts.iter().map(|part| part.len()).sum();
        if needed > self.remaining() {
            return false;
        }
        for part in parts {
            self.text.push_str(part);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Renders `throwable` as seen on the thread named `thread_name`.
///
/// Returns `None` when the header line cannot be produced or does not fit
/// into `max_len`. Otherwise the result is never longer than `max_len`.
pub fn render_stack_trace<I: ExceptionInspector>(
    inspector: &I,
    thread_name: &str,
    throwable: &I::Throwable,
    max_len: usize,
) -> Option<String> {
    let mut buffer = TraceBuffer::new(max_len);

    let summary = inspector.describe(throwable)?;
    if !buffer.try_push(&["Exception in thread \"", thread_name, "\" ", &summary, "\n"]) {
        debug!("exception header does not fit into {max_len} bytes");
        return None;
    }

    if !render_frames(inspector, throwable, &mut buffer) {
        return Some(buffer.into_string());
    }

    // A cyclic cause chain keeps adding lines until the budget runs out.
    let mut current = inspector.cause(throwable);
    while let Some(cause) = current {
        let Some(summary) = inspector.describe(&cause) else {
            break;
        };
        if !buffer.try_push(&["Caused by: ", &summary, "\n"]) {
            break;
        }
        if !render_frames(inspector, &cause, &mut buffer) {
            break;
        }
        current = inspector.cause(&cause);
    }

    Some(buffer.into_string())
}

/// Appends the frames of `throwable`; `false` once nothing more can be added.
fn render_frames<I: ExceptionInspector>(inspector: &I, throwable: &I::Throwable, buffer: &mut TraceBuffer) -> bool {
    let Some(trace) = inspector.stack_trace(throwable) else {
        debug!("cannot get stack trace of an exception");
        return true;
    };

    for index in 0..inspector.frame_count(&trace) {
        let Some(frame) = inspector.frame(&trace, index) else {
            debug!("cannot render frame {index}");
            return false;
        };
        let location = frame.location.as_deref().unwrap_or(UNKNOWN_LOCATION);
        if !buffer.try_push(&["\tat ", &frame.description, " [", location, "]\n"]) {
            return false;
        }
    }
    true
}
