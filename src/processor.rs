//! Event decision logic.
//!
//! [`EventProcessor`] owns everything the event handlers share: the thread
//! registry with its exception caches, the report sink and the event log. It
//! works on decoded event records and reaches the VM only through
//! [`RaisedException`], so it can be driven without a JVM.
//!
//! Thread lifecycle and exception handling are serialized by one lock. GC
//! callbacks run while the VM is stopped and do not take it.
//!
//! Handling an exception calls back into Java (`equals`, `toString`,
//! `getResource`). Anything those throw raises a nested exception event on
//! the same thread while the lock is held; such events are dropped.

use std::cell::Cell;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{Configuration, ExecutableSource};
use crate::events::{CompiledMethodEvent, ExceptionCatchEvent, ExceptionEvent, ObjectAllocEvent, ThreadId};
use crate::exception_cache::{ExceptionCache, SameThrowable, DEFAULT_CAPACITY};
use crate::process::{self, ProcessProperties, UNKNOWN_CLASS_NAME};
use crate::report::{EventLog, ProblemReport, ReportSink};
use crate::stack_trace::MAX_STACK_TRACE_LENGTH;
use crate::thread_registry::ThreadRegistry;

/// GC pauses longer than this are reported.
pub const GC_TIME_THRESHOLD: Duration = Duration::from_secs(1);

/// VM allocations of at least this many bytes are logged.
pub const LARGE_ALLOCATION_THRESHOLD: i64 = 1024;

/// Method name used in slow-GC reports.
pub const GC_METHOD_NAME: &str = "GC thread";

/// Backtrace used in slow-GC reports.
pub const NO_STACK_TRACE: &str = "no stack trace";

thread_local! {
    static IN_EXCEPTION_HANDLER: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as busy handling an exception event.
struct HandlerScope;

impl HandlerScope {
    /// `None` when the thread is already inside a handler.
    fn enter() -> Option<Self> {
        IN_EXCEPTION_HANDLER.with(|active| (!active.replace(true)).then_some(HandlerScope))
    }
}

impl Drop for HandlerScope {
    fn drop(&mut self) {
        IN_EXCEPTION_HANDLER.with(|active| active.set(false));
    }
}

/// VM-side view of the exception an event refers to.
pub trait RaisedException {
    /// An owned reference that keeps the exception alive in a cache.
    type Handle: SameThrowable<Self>;

    fn retain(&self) -> Option<Self::Handle>;

    /// Renders the stack trace, at most `max_len` bytes.
    fn render(&self, thread_name: &str, max_len: usize) -> Option<String>;

    /// Location of the class at the bottom of the exception's stack.
    fn entry_class_location(&self) -> Option<String>;
}

/// What happened to an exception event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Caught and not in the `caught` list.
    NotEvaluated,
    /// The same exception was already reported by this thread.
    AlreadyReported,
    /// Eligible, but no stack trace could be produced.
    NotRendered,
    /// Handed to the report sink.
    Reported,
    /// Thrown by Java code the agent called while handling another exception.
    Nested,
}

/// Shared state of all event handlers.
///
/// Slow-GC reports are submitted outside the thread lock, so the sink may be
/// called from a GC callback and an exception handler at the same time.
pub struct EventProcessor<H, S> {
    config: Configuration,
    sink: S,
    log: EventLog,
    process: OnceLock<ProcessProperties>,
    threads: Mutex<ThreadRegistry<ExceptionCache<H>>>,
    gc_started: Mutex<Option<Instant>>,
}

impl<H, S: ReportSink> EventProcessor<H, S> {
    pub fn new(config: Configuration, sink: S, log: EventLog) -> Self {
        EventProcessor {
            config,
            sink,
            log,
            process: OnceLock::new(),
            threads: Mutex::new(ThreadRegistry::new()),
            gc_started: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Records the process facts gathered at VM init. Only the first call counts.
    pub fn set_process_properties(&self, properties: ProcessProperties) {
        debug!("process properties:\n{}", properties.summary());
        if self.process.set(properties).is_err() {
            debug!("process properties already set");
        }
    }

    pub fn process_properties(&self) -> Option<&ProcessProperties> {
        self.process.get()
    }

    fn main_class(&self) -> &str {
        self.process
            .get()
            .map_or(UNKNOWN_CLASS_NAME, |properties| properties.main_class.as_str())
    }

    fn lock_threads(&self) -> MutexGuard<'_, ThreadRegistry<ExceptionCache<H>>> {
        self.threads.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates the exception cache of a new thread.
    pub fn thread_started(&self, tid: ThreadId) {
        let mut threads = self.lock_threads();
        if !threads.push(tid, ExceptionCache::new(DEFAULT_CAPACITY)) {
            debug!("thread {tid} is already registered");
        }
    }

    /// Unregisters a finished thread and hands back its cache.
    ///
    /// The caller drops the cache once the lock is released.
    pub fn thread_ended(&self, tid: ThreadId) -> Option<ExceptionCache<H>> {
        let removed = self.lock_threads().pop(tid);
        if removed.is_none() {
            debug!("thread {tid} was not registered");
        }
        removed
    }

    pub fn registered_threads(&self) -> usize {
        self.lock_threads().len()
    }

    /// Decides whether an exception is reported, and reports it.
    pub fn exception_raised<E>(&self, event: &ExceptionEvent, exception: &E) -> Decision
    where
        E: RaisedException<Handle = H>,
        H: SameThrowable<E>,
    {
        let Some(_scope) = HandlerScope::enter() else {
            debug!("ignoring {} raised while handling another exception", event.exception_type);
            return Decision::Nested;
        };

        let method = &event.method;
        let line = format!(
            "{} {} exception in thread \"{}\" in a method {}.{}() with signature {}",
            event.kind_label(),
            event.exception_type,
            event.thread_name,
            method.class_name,
            method.name,
            method.signature,
        );
        info!("{line}");

        let traced = self.config.is_debug_method(&method.qualified_name());
        let evaluated = !event.caught || self.config.reports_caught(&event.exception_type);
        if !evaluated {
            if traced {
                debug!("{}: caught {} is not in the caught list", method.qualified_name(), event.exception_type);
            }
            return Decision::NotEvaluated;
        }
        self.log.write(&line);

        let mut threads = self.lock_threads();
        match event.thread_id.and_then(|tid| threads.get_mut(tid)) {
            Some(cache) => {
                if cache.find(exception).is_some() {
                    debug!("exception {} already reported in thread \"{}\"", event.exception_type, event.thread_name);
                    return Decision::AlreadyReported;
                }
                match exception.retain() {
                    Some(handle) => cache.push(handle),
                    None => warn!("cannot keep a reference to {}; it may be reported again", event.exception_type),
                }
            }
            None => debug!(
                "no exception cache for thread \"{}\"; reporting without de-duplication",
                event.thread_name
            ),
        }

        let trace = exception
            .render(&event.thread_name, MAX_STACK_TRACE_LENGTH)
            .filter(|trace| !trace.is_empty());
        let Some(trace) = trace else {
            warn!("cannot get the stack trace of {}", event.exception_type);
            return Decision::NotRendered;
        };
        if traced {
            debug!("{}: reporting {}:\n{trace}", method.qualified_name(), event.exception_type);
        }

        let executable = match self.config.executable {
            ExecutableSource::MainClass => self.main_class().to_owned(),
            ExecutableSource::ThreadClass => exception
                .entry_class_location()
                .map(|location| process::strip_main_class_path(&location).to_owned())
                .unwrap_or_else(|| self.main_class().to_owned()),
        };
        let message = format!("{} exception", event.kind_label());
        self.submit(ProblemReport::new(&executable, &message, &method.name, &trace));

        self.log.write(&trace);
        Decision::Reported
    }

    pub fn exception_caught(&self, event: &ExceptionCatchEvent) {
        let Some(_scope) = HandlerScope::enter() else {
            return;
        };
        debug!(
            "An exception was caught in a method {}.{}() with signature {}",
            event.method.class_name, event.method.name, event.method.signature
        );
        if self.config.is_debug_method(&event.method.qualified_name()) {
            debug!("{} caught {} in thread \"{}\"", event.method.qualified_name(), event.exception_type, event.thread_name);
        }
    }

    pub fn object_allocated(&self, event: &ObjectAllocEvent) {
        if event.size >= LARGE_ALLOCATION_THRESHOLD {
            info!(
                "object allocation: instance of class {}, allocated {} bytes",
                event.class_name, event.size
            );
        }
    }

    pub fn object_freed(&self) {
        debug!("object free");
    }

    pub fn compiled_method_loaded(&self, event: &CompiledMethodEvent) {
        debug!(
            "Compiling method: {}.{} with signature {}   Code size: {:5}",
            event.method.class_name, event.method.name, event.method.signature, event.code_size
        );
    }

    pub fn gc_started(&self) {
        debug!("GC start");
        *self.gc_started.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Instant::now());
    }

    /// Ends the pause begun by [`gc_started`](Self::gc_started).
    pub fn gc_finished(&self) {
        debug!("GC end");
        let started = self.gc_started.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        match started {
            Some(started) => {
                self.gc_pause(started.elapsed());
            }
            None => debug!("GC finished without a recorded start"),
        }
    }

    /// Reports a GC pause longer than [`GC_TIME_THRESHOLD`]; returns whether it did.
    pub fn gc_pause(&self, elapsed: Duration) -> bool {
        if elapsed <= GC_TIME_THRESHOLD {
            return false;
        }
        let message = format!("GC took more time than expected: {}", elapsed.as_secs());
        warn!("{message}");
        self.submit(ProblemReport::new(self.main_class(), &message, GC_METHOD_NAME, NO_STACK_TRACE));
        self.log.write(&message);
        true
    }

    fn submit(&self, mut report: ProblemReport) {
        if let Some(properties) = self.process.get() {
            report.add_process_data(properties, process::environ());
        }
        if let Err(err) = self.sink.submit(&report) {
            warn!("problem report was not delivered everywhere: {err}");
        }
    }

    /// Releases every exception cache. Called while JNI is still usable.
    pub fn shutdown(&self) {
        let mut threads = self.lock_threads();
        debug!("releasing exception caches of {} threads", threads.len());
        threads.clear();
    }
}
