use std::io::{Read, Write};
use std::os::unix::net::{UnixDatagram, UnixListener};
use std::sync::{Arc, Mutex};
use std::thread;

use abrt_java_agent::config::{Configuration, LogOutput};
use abrt_java_agent::error::{AgentError, Result};
use abrt_java_agent::process::{current_uid, ProcessProperties};
use abrt_java_agent::report::{Dispatcher, EventLog, ProblemReport, ReportSink};
use abrt_java_agent::transport::{abrt_request, journal_fields, journal_payload, AbrtSocket, Journald};

fn sample_report() -> ProblemReport {
    ProblemReport::new(
        "/srv/app.jar",
        "Uncaught exception",
        "main",
        "Exception in thread \"main\" java.lang.Error\n\tat App.main(App.java:1) [unknown]\n",
    )
}

#[test]
fn new_report_has_the_required_elements() {
    let report = sample_report();
    let keys: Vec<&str> = report.items().map(|(k, _)| k).collect();
    assert_eq!(keys, ["type", "analyzer", "uid", "executable", "backtrace", "reason"]);
    assert_eq!(report.reason(), "Uncaught exception in method main");
    assert_eq!(report.get("uid"), Some(current_uid().to_string().as_str()));
}

#[test]
fn process_data_goes_to_java_executable_when_executable_is_set() {
    let properties = ProcessProperties {
        pid: 7,
        uid: 0,
        executable: Some("/usr/bin/java".to_owned()),
        command_line: None,
        main_class: "*unknown*".to_owned(),
        jvm_environment: String::new(),
    };

    let mut report = sample_report();
    report.add_process_data(&properties, Some("HOME=/root".to_owned()));
    assert_eq!(report.get("executable"), Some("/srv/app.jar"));
    assert_eq!(report.get("java_executable"), Some("/usr/bin/java"));
    assert_eq!(report.get("environ"), Some("HOME=/root"));
    assert_eq!(report.get("pid"), Some("7"));
    assert_eq!(report.get("cmdline"), Some(""));
}

#[test]
fn add_replaces_existing_values() {
    let mut report = sample_report();
    report.add("reason", "other");
    assert_eq!(report.reason(), "other");
    assert_eq!(report.items().filter(|(k, _)| *k == "reason").count(), 1);
}

#[test]
fn abrt_request_format() {
    let mut report = ProblemReport::default();
    report.add("type", "Java");
    report.add("reason", "x");
    assert_eq!(abrt_request(&report), b"POST / HTTP/1.1\r\n\r\ntype=Java\0reason=x\0".to_vec());
}

fn serve_once(listener: UnixListener, status: &'static str) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        stream.read_to_end(&mut request).unwrap();
        stream.write_all(status.as_bytes()).unwrap();
        request
    })
}

#[test]
fn abrt_socket_accepts_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("abrt.socket");
    let server = serve_once(UnixListener::bind(&path).unwrap(), "HTTP/1.1 201 Created\r\n\r\n");

    AbrtSocket::new(&path).submit(&sample_report()).unwrap();

    let request = server.join().unwrap();
    assert!(request.starts_with(b"POST / HTTP/1.1\r\n\r\n"));
    assert!(request.ends_with(b"reason=Uncaught exception in method main\0"));
}

#[test]
fn abrt_socket_reports_rejection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("abrt.socket");
    let server = serve_once(UnixListener::bind(&path).unwrap(), "HTTP/1.1 400 Bad Request\r\n\r\n");

    let err = AbrtSocket::new(&path).submit(&sample_report()).unwrap_err();
    assert!(matches!(
        err,
        AgentError::Rejected { destination: "abrt", ref reason } if reason == "HTTP/1.1 400 Bad Request"
    ));
    server.join().unwrap();
}

#[test]
fn abrt_socket_missing_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AbrtSocket::new(dir.path().join("none")).submit(&sample_report()).unwrap_err();
    assert!(matches!(err, AgentError::Io(_)));
}

#[test]
fn journal_payload_length_prefixes_multiline_values() {
    let payload = journal_payload([("MESSAGE", "hi"), ("STACK_TRACE", "a\nb")]);
    let mut expected = b"MESSAGE=hi\nSTACK_TRACE\n".to_vec();
    expected.extend_from_slice(&3u64.to_le_bytes());
    expected.extend_from_slice(b"a\nb\n");
    assert_eq!(payload, expected);
}

#[test]
fn journald_receives_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.socket");
    let socket = UnixDatagram::bind(&path).unwrap();

    let report = sample_report();
    Journald::new(&path).submit(&report).unwrap();

    let mut buf = vec![0u8; 64 * 1024];
    let len = socket.recv(&mut buf).unwrap();
    assert_eq!(&buf[..len], journal_payload(journal_fields(&report)).as_slice());

    let text = String::from_utf8_lossy(&buf[..len]);
    assert!(text.starts_with("MESSAGE=Uncaught exception in method main\nPRIORITY=3\n"));
    assert!(text.contains("SYSLOG_IDENTIFIER=abrt-java-connector\n"));
    assert!(text.contains("JAVA_EXECUTABLE=/srv/app.jar\n"));
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<usize>>);

impl ReportSink for Recorder {
    fn submit(&self, _report: &ProblemReport) -> Result<()> {
        *self.0.lock().unwrap() += 1;
        Ok(())
    }
}

struct Failing;

impl ReportSink for Failing {
    fn submit(&self, _report: &ProblemReport) -> Result<()> {
        Err(AgentError::Rejected {
            destination: "test",
            reason: "down".to_owned(),
        })
    }
}

#[test]
fn dispatcher_tries_every_destination() {
    let recorder = Recorder::default();
    let dispatcher = Dispatcher::new()
        .with_destination("failing", Box::new(Failing))
        .with_destination("recorder", Box::new(recorder.clone()));

    let err = dispatcher.submit(&sample_report()).unwrap_err();
    assert!(matches!(err, AgentError::Rejected { destination: "test", .. }));
    assert_eq!(*recorder.0.lock().unwrap(), 1);
}

#[test]
fn dispatcher_follows_configuration() {
    let dispatcher = Dispatcher::from_config(&Configuration::default());
    assert_eq!(dispatcher.names(), ["journald"]);

    let mut config = Configuration::default();
    config.parse_command_line("abrt=on,syslog=on,journald=off");
    assert_eq!(Dispatcher::from_config(&config).names(), ["abrt", "syslog"]);

    config.parse_command_line("abrt=off,syslog=off");
    // off never removes a destination that was enabled
    assert_eq!(Dispatcher::from_config(&config).names(), ["abrt", "syslog"]);

    assert!(Dispatcher::new().is_empty());
    assert!(Dispatcher::new().submit(&sample_report()).is_ok());
}

#[test]
fn event_log_writes_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");
    let log = EventLog::open(&LogOutput::Path(path.clone())).unwrap();
    assert!(log.is_enabled());

    log.write("first");
    log.write("second\n");
    log.flush().unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
}

#[test]
fn event_log_disabled_and_unwritable() {
    let log = EventLog::open(&LogOutput::Disabled).unwrap();
    assert!(!log.is_enabled());
    log.write("dropped");

    let dir = tempfile::tempdir().unwrap();
    let bad = LogOutput::Path(dir.path().join("missing").join("events.log"));
    assert!(matches!(EventLog::open(&bad), Err(AgentError::LogFile { .. })));
}
