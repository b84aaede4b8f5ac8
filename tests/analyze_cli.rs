use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

const REMOTE_TRACE: &str = "\
Exception in thread \"main\" java.lang.RuntimeException: boom
\tat com.example.App.run(App.java:12) [http://example.com/app.jar]
\tat com.example.App.main(App.java:5) [file:/opt/app/app.jar]
";

const LOCAL_TRACE: &str = "\
Exception in thread \"main\" java.lang.RuntimeException: boom
\tat com.example.App.run(App.java:12) [file:/opt/app/app.jar]
";

fn analyzer() -> Command {
    Command::cargo_bin("abrt-action-analyze-java").unwrap()
}

#[test]
fn dump_dir_results_are_written_next_to_the_backtrace() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("backtrace"), REMOTE_TRACE).unwrap();

    analyzer().arg("-d").arg(dir.path()).assert().success();

    let duphash = fs::read_to_string(dir.path().join("duphash")).unwrap();
    assert_eq!(duphash.len(), 40);
    assert_eq!(fs::read_to_string(dir.path().join("uuid")).unwrap(), duphash);
    let message = fs::read_to_string(dir.path().join("not-reportable")).unwrap();
    assert!(message.contains("jar/class at http://example.com/app.jar."));
}

#[test]
fn local_code_is_reportable() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("backtrace"), LOCAL_TRACE).unwrap();

    analyzer().args(["--dumpdir"]).arg(dir.path()).assert().success();
    assert!(dir.path().join("duphash").exists());
    assert!(!dir.path().join("not-reportable").exists());
}

#[test]
fn stdout_mode_prints_results() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("trace.txt");
    fs::write(&file, REMOTE_TRACE).unwrap();

    analyzer()
        .arg("-o")
        .arg("-f")
        .arg(&file)
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("duphash: "))
        .stdout(predicate::str::contains("ABRT will not allow you to submit this problem"));
    assert!(!dir.path().join("duphash").exists());
}

#[test]
fn stdin_results_go_to_the_current_directory() {
    let dir = tempfile::tempdir().unwrap();

    analyzer()
        .current_dir(dir.path())
        .write_stdin(LOCAL_TRACE)
        .assert()
        .success();
    assert!(dir.path().join("duphash").exists());
    assert!(dir.path().join("uuid").exists());
}

#[test]
fn unparseable_backtrace_fails() {
    let dir = tempfile::tempdir().unwrap();
    analyzer()
        .current_dir(dir.path())
        .write_stdin("definitely not a java trace")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Could not parse the stack trace"));
}

#[test]
fn missing_backtrace_fails() {
    let dir = tempfile::tempdir().unwrap();
    analyzer().arg("-d").arg(dir.path()).assert().failure().code(1);
}

#[test]
fn dump_dir_and_file_conflict() {
    analyzer().args(["-d", "/tmp", "-f", "/tmp/x"]).assert().failure();
}
