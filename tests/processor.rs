use std::cell::Cell;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use abrt_java_agent::config::{Configuration, ExecutableSource};
use abrt_java_agent::error::{AgentError, Result};
use abrt_java_agent::events::{ExceptionCatchEvent, ExceptionEvent, MethodRef};
use abrt_java_agent::exception_cache::SameThrowable;
use abrt_java_agent::process::ProcessProperties;
use abrt_java_agent::processor::{Decision, EventProcessor, RaisedException, GC_METHOD_NAME, NO_STACK_TRACE};
use abrt_java_agent::report::{EventLog, ProblemReport, ReportSink};

#[derive(Default)]
struct Recorder {
    reports: Mutex<Vec<ProblemReport>>,
}

impl Recorder {
    fn reports(&self) -> Vec<ProblemReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl ReportSink for Recorder {
    fn submit(&self, report: &ProblemReport) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

struct FakeException {
    id: u32,
    summary: Option<&'static str>,
    entry: Option<&'static str>,
}

impl FakeException {
    fn new(id: u32) -> Self {
        FakeException {
            id,
            summary: Some("java.lang.RuntimeException: boom"),
            entry: None,
        }
    }
}

struct FakeHandle(u32);

impl SameThrowable<FakeException> for FakeHandle {
    fn same_throwable(&self, exception: &FakeException) -> Result<bool> {
        Ok(self.0 == exception.id)
    }
}

impl RaisedException for FakeException {
    type Handle = FakeHandle;

    fn retain(&self) -> Option<FakeHandle> {
        Some(FakeHandle(self.id))
    }

    fn render(&self, thread_name: &str, _max_len: usize) -> Option<String> {
        self.summary.map(|summary| {
            format!("Exception in thread \"{thread_name}\" {summary}\n\tat com.example.App.run(App.java:7) [unknown]\n")
        })
    }

    fn entry_class_location(&self) -> Option<String> {
        self.entry.map(str::to_owned)
    }
}

/// Raises a nested exception event from inside `equals` or `toString`, the
/// way the VM does when that Java code throws.
struct CallsBack<'a> {
    processor: &'a EventProcessor<FakeHandle, Recorder>,
    from_equals: bool,
    nested: Cell<Option<Decision>>,
}

impl<'a> CallsBack<'a> {
    fn new(processor: &'a EventProcessor<FakeHandle, Recorder>, from_equals: bool) -> Self {
        CallsBack { processor, from_equals, nested: Cell::new(None) }
    }

    fn raise_nested(&self) {
        let thrown = event(Some(1), "java.lang.NullPointerException", false);
        self.nested.set(Some(self.processor.exception_raised(&thrown, &FakeException::new(99))));
        self.processor.exception_caught(&ExceptionCatchEvent {
            thread_name: "main".to_owned(),
            exception_type: "java.lang.NullPointerException".to_owned(),
            method: MethodRef::new("com.example.Broken", "equals", "(Ljava/lang/Object;)Z"),
        });
    }
}

impl SameThrowable<CallsBack<'_>> for FakeHandle {
    fn same_throwable(&self, exception: &CallsBack<'_>) -> Result<bool> {
        if exception.from_equals {
            exception.raise_nested();
            return Err(AgentError::Jni("CallBooleanMethod"));
        }
        Ok(false)
    }
}

impl RaisedException for CallsBack<'_> {
    type Handle = FakeHandle;

    fn retain(&self) -> Option<FakeHandle> {
        Some(FakeHandle(50))
    }

    fn render(&self, thread_name: &str, _max_len: usize) -> Option<String> {
        if !self.from_equals {
            self.raise_nested();
        }
        Some(format!("Exception in thread \"{thread_name}\" com.example.Broken\n"))
    }

    fn entry_class_location(&self) -> Option<String> {
        None
    }
}

#[derive(Clone, Default)]
struct SharedLog(Arc<Mutex<Vec<u8>>>);

impl SharedLog {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn processor(options: &str) -> EventProcessor<FakeHandle, Recorder> {
    let mut config = Configuration::default();
    config.parse_command_line(options);
    EventProcessor::new(config, Recorder::default(), EventLog::disabled())
}

fn event(tid: Option<i64>, exception_type: &str, caught: bool) -> ExceptionEvent {
    ExceptionEvent {
        thread_id: tid,
        thread_name: "main".to_owned(),
        exception_type: exception_type.to_owned(),
        method: MethodRef::new("com.example.App", "run", "()V"),
        caught,
    }
}

#[test]
fn uncaught_exception_is_reported_once_per_thread() {
    let processor = processor("");
    processor.thread_started(1);
    let exception = FakeException::new(10);
    let ev = event(Some(1), "java.lang.RuntimeException", false);

    assert_eq!(processor.exception_raised(&ev, &exception), Decision::Reported);
    assert_eq!(processor.exception_raised(&ev, &exception), Decision::AlreadyReported);

    let reports = processor.sink().reports();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.reason(), "Uncaught exception in method run");
    assert_eq!(report.get("type"), Some("Java"));
    assert_eq!(report.get("analyzer"), Some("Java"));
    assert_eq!(report.get("executable"), Some("*unknown*"));
    assert!(report.backtrace().starts_with("Exception in thread \"main\" java.lang.RuntimeException: boom\n"));
}

#[test]
fn each_thread_has_its_own_cache() {
    let processor = processor("");
    processor.thread_started(1);
    processor.thread_started(2);
    let exception = FakeException::new(10);

    assert_eq!(processor.exception_raised(&event(Some(1), "E", false), &exception), Decision::Reported);
    assert_eq!(processor.exception_raised(&event(Some(2), "E", false), &exception), Decision::Reported);
    assert_eq!(processor.sink().reports().len(), 2);
}

#[test]
fn caught_exceptions_need_to_be_listed() {
    let processor = processor("caught=java.io.IOException");
    processor.thread_started(1);

    let ignored = event(Some(1), "java.lang.IllegalStateException", true);
    assert_eq!(processor.exception_raised(&ignored, &FakeException::new(1)), Decision::NotEvaluated);

    let listed = event(Some(1), "java.io.IOException", true);
    assert_eq!(processor.exception_raised(&listed, &FakeException::new(2)), Decision::Reported);

    let reports = processor.sink().reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].reason(), "Caught exception in method run");
}

#[test]
fn unknown_threads_report_without_deduplication() {
    let processor = processor("");
    let exception = FakeException::new(3);

    assert_eq!(processor.exception_raised(&event(Some(99), "E", false), &exception), Decision::Reported);
    assert_eq!(processor.exception_raised(&event(None, "E", false), &exception), Decision::Reported);
    assert_eq!(processor.sink().reports().len(), 2);
}

#[test]
fn ended_thread_forgets_its_exceptions() {
    let processor = processor("");
    processor.thread_started(4);
    let exception = FakeException::new(1);
    processor.exception_raised(&event(Some(4), "E", false), &exception);

    let cache = processor.thread_ended(4).expect("thread was registered");
    assert_eq!(cache.len(), 1);
    assert_eq!(processor.registered_threads(), 0);
    assert!(processor.thread_ended(4).is_none());
}

#[test]
fn evicted_exception_is_reported_again() {
    let processor = processor("");
    processor.thread_started(1);
    let ev = event(Some(1), "E", false);

    for id in 0..6 {
        assert_eq!(processor.exception_raised(&ev, &FakeException::new(id)), Decision::Reported);
    }
    // capacity 5: id 0 was pushed out by id 5
    assert_eq!(processor.exception_raised(&ev, &FakeException::new(0)), Decision::Reported);
    assert_eq!(processor.exception_raised(&ev, &FakeException::new(5)), Decision::AlreadyReported);
}

#[test]
fn unrenderable_exception_is_not_reported() {
    let processor = processor("");
    processor.thread_started(1);
    let mut exception = FakeException::new(1);
    exception.summary = None;

    assert_eq!(processor.exception_raised(&event(Some(1), "E", false), &exception), Decision::NotRendered);
    assert!(processor.sink().reports().is_empty());
}

#[test]
fn thread_class_executable_uses_the_entry_class_location() {
    let processor = processor("executable=threadclass");
    assert_eq!(processor.config().executable, ExecutableSource::ThreadClass);
    processor.set_process_properties(ProcessProperties {
        pid: 1234,
        uid: 1000,
        executable: Some("/usr/lib/jvm/bin/java".to_owned()),
        command_line: Some("java -jar app.jar".to_owned()),
        main_class: "/srv/main.jar".to_owned(),
        jvm_environment: "java.home                     : /usr/lib/jvm\n".to_owned(),
    });

    let mut from_jar = FakeException::new(1);
    from_jar.entry = Some("file:/opt/worker.jar!/com/example/Worker.class");
    processor.exception_raised(&event(None, "E", false), &from_jar);

    let fallback = FakeException::new(2);
    processor.exception_raised(&event(None, "E", false), &fallback);

    let reports = processor.sink().reports();
    assert_eq!(reports[0].get("executable"), Some("/opt/worker.jar"));
    assert_eq!(reports[1].get("executable"), Some("/srv/main.jar"));

    let report = &reports[0];
    assert_eq!(report.get("pid"), Some("1234"));
    assert_eq!(report.get("java_executable"), Some("/usr/lib/jvm/bin/java"));
    assert_eq!(report.get("cmdline"), Some("java -jar app.jar"));
    assert!(report.get("jvm_environment").unwrap().contains("/usr/lib/jvm"));
    assert!(report.contains("environ"));
}

#[test]
fn main_class_executable_ignores_the_entry_class() {
    let processor = processor("");
    let mut exception = FakeException::new(1);
    exception.entry = Some("/opt/worker.jar");
    processor.exception_raised(&event(None, "E", false), &exception);
    assert_eq!(processor.sink().reports()[0].get("executable"), Some("*unknown*"));
}

#[test]
fn reported_exceptions_are_written_to_the_event_log() {
    let log = SharedLog::default();
    let processor = EventProcessor::new(
        Configuration::default(),
        Recorder::default(),
        EventLog::from_writer(log.clone()),
    );
    processor.exception_raised(&event(None, "java.lang.Error", false), &FakeException::new(1));

    let text = log.text();
    assert!(text.starts_with(
        "Uncaught java.lang.Error exception in thread \"main\" in a method com.example.App.run() with signature ()V\n"
    ));
    assert!(text.contains("\tat com.example.App.run(App.java:7) [unknown]\n"));
}

#[test]
fn evaluated_exceptions_are_logged_even_without_a_stack_trace() {
    let log = SharedLog::default();
    let processor = EventProcessor::new(
        Configuration::default(),
        Recorder::default(),
        EventLog::from_writer(log.clone()),
    );
    let mut exception = FakeException::new(1);
    exception.summary = None;

    let decision = processor.exception_raised(&event(None, "java.lang.Error", false), &exception);
    assert_eq!(decision, Decision::NotRendered);
    assert_eq!(
        log.text(),
        "Uncaught java.lang.Error exception in thread \"main\" in a method com.example.App.run() with signature ()V\n"
    );

    // not evaluated: nothing is logged
    processor.exception_raised(&event(None, "java.lang.Error", true), &FakeException::new(2));
    assert_eq!(log.text().lines().count(), 1);
}

#[test]
fn exception_thrown_by_to_string_is_ignored() {
    let processor = processor("");
    processor.thread_started(1);
    let outer = CallsBack::new(&processor, false);

    assert_eq!(processor.exception_raised(&event(Some(1), "com.example.Broken", false), &outer), Decision::Reported);
    assert_eq!(outer.nested.get(), Some(Decision::Nested));

    let reports = processor.sink().reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].backtrace().contains("com.example.Broken"));

    // the thread handles later exceptions normally
    let later = FakeException::new(99);
    assert_eq!(processor.exception_raised(&event(Some(1), "E", false), &later), Decision::Reported);
}

#[test]
fn exception_thrown_by_equals_is_ignored() {
    let processor = processor("");
    processor.thread_started(1);
    let ev = event(Some(1), "com.example.Broken", false);
    processor.exception_raised(&ev, &FakeException::new(1));

    // a failing equals counts as a miss, so the exception is reported
    let outer = CallsBack::new(&processor, true);
    assert_eq!(processor.exception_raised(&ev, &outer), Decision::Reported);
    assert_eq!(outer.nested.get(), Some(Decision::Nested));
    assert_eq!(processor.sink().reports().len(), 2);
}

#[test]
fn slow_gc_is_reported() {
    let processor = processor("");

    assert!(!processor.gc_pause(Duration::from_millis(500)));
    assert!(!processor.gc_pause(Duration::from_secs(1)));
    assert!(processor.gc_pause(Duration::from_millis(2_500)));

    let reports = processor.sink().reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].reason(),
        format!("GC took more time than expected: 2 in method {GC_METHOD_NAME}")
    );
    assert_eq!(reports[0].backtrace(), NO_STACK_TRACE);
}

#[test]
fn gc_and_exception_reports_may_overlap() {
    let processor = processor("");
    std::thread::scope(|scope| {
        scope.spawn(|| assert!(processor.gc_pause(Duration::from_secs(3))));
        scope.spawn(|| {
            let decision = processor.exception_raised(&event(None, "E", false), &FakeException::new(1));
            assert_eq!(decision, Decision::Reported);
        });
    });
    assert_eq!(processor.sink().reports().len(), 2);
}

#[test]
fn quick_gc_cycle_is_not_reported() {
    let processor = processor("");
    processor.gc_started();
    processor.gc_finished();
    // a finish without a start is ignored
    processor.gc_finished();
    assert!(processor.sink().reports().is_empty());
}

#[test]
fn shutdown_releases_all_caches() {
    let processor = processor("");
    for tid in 0..10 {
        processor.thread_started(tid);
    }
    processor.thread_started(3);
    assert_eq!(processor.registered_threads(), 10);

    processor.shutdown();
    assert_eq!(processor.registered_threads(), 0);
}
