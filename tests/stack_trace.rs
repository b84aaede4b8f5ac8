use abrt_java_agent::stack_trace::{render_stack_trace, ExceptionInspector, FrameText, TraceBuffer, MAX_STACK_TRACE_LENGTH};

/// Throwables addressed by index; a trace is the index of its throwable.
#[derive(Default)]
struct FakeInspector {
    throwables: Vec<FakeThrowable>,
}

struct FakeThrowable {
    summary: Option<String>,
    frames: Option<Vec<Option<FrameText>>>,
    cause: Option<usize>,
}

impl FakeInspector {
    fn add(&mut self, summary: &str, frames: &[(&str, Option<&str>)], cause: Option<usize>) -> usize {
        let frames = frames
            .iter()
            .map(|(description, location)| {
                Some(FrameText {
                    description: description.to_string(),
                    location: location.map(str::to_owned),
                })
            })
            .collect();
        self.throwables.push(FakeThrowable {
            summary: Some(summary.to_owned()),
            frames: Some(frames),
            cause,
        });
        self.throwables.len() - 1
    }
}

impl ExceptionInspector for FakeInspector {
    type Throwable = usize;
    type Trace = usize;

    fn describe(&self, throwable: &usize) -> Option<String> {
        self.throwables[*throwable].summary.clone()
    }

    fn stack_trace(&self, throwable: &usize) -> Option<usize> {
        self.throwables[*throwable].frames.as_ref().map(|_| *throwable)
    }

    fn frame_count(&self, trace: &usize) -> usize {
        self.throwables[*trace].frames.as_ref().map_or(0, Vec::len)
    }

    fn frame(&self, trace: &usize, index: usize) -> Option<FrameText> {
        self.throwables[*trace].frames.as_ref()?.get(index)?.clone()
    }

    fn cause(&self, throwable: &usize) -> Option<usize> {
        self.throwables[*throwable].cause
    }
}

#[test]
fn renders_header_and_frames() {
    let mut fake = FakeInspector::default();
    let ex = fake.add(
        "java.lang.RuntimeException: boom",
        &[
            ("Demo.run(Demo.java:10)", Some("file:/srv/Demo.class")),
            ("Demo.main(Demo.java:3)", None),
        ],
        None,
    );

    let trace = render_stack_trace(&fake, "main", &ex, MAX_STACK_TRACE_LENGTH);
    assert_eq!(
        trace.as_deref(),
        Some(
            "Exception in thread \"main\" java.lang.RuntimeException: boom\n\
             \tat Demo.run(Demo.java:10) [file:/srv/Demo.class]\n\
             \tat Demo.main(Demo.java:3) [unknown]\n"
        )
    );
}

#[test]
fn renders_cause_chain() {
    let mut fake = FakeInspector::default();
    let root = fake.add("java.io.IOException: disk", &[("Store.write(Store.java:7)", None)], None);
    let top = fake.add("java.lang.IllegalStateException", &[("App.run(App.java:1)", None)], Some(root));

    let trace = render_stack_trace(&fake, "worker-1", &top, MAX_STACK_TRACE_LENGTH).unwrap();
    assert_eq!(
        trace,
        "Exception in thread \"worker-1\" java.lang.IllegalStateException\n\
         \tat App.run(App.java:1) [unknown]\n\
         Caused by: java.io.IOException: disk\n\
         \tat Store.write(Store.java:7) [unknown]\n"
    );
}

#[test]
fn truncates_at_whole_lines() {
    let mut fake = FakeInspector::default();
    let frames: Vec<(String, Option<&str>)> = (0..50)
        .map(|i| (format!("Deep.level{i}(Deep.java:{i})"), None))
        .collect();
    let frames: Vec<(&str, Option<&str>)> = frames.iter().map(|(d, l)| (d.as_str(), *l)).collect();
    let ex = fake.add("java.lang.StackOverflowError", &frames, None);

    let header = "Exception in thread \"main\" java.lang.StackOverflowError\n";
    let first = "\tat Deep.level0(Deep.java:0) [unknown]\n";
    let limit = header.len() + first.len() + 5;

    let trace = render_stack_trace(&fake, "main", &ex, limit).unwrap();
    assert_eq!(trace, format!("{header}{first}"));
    assert!(trace.len() <= limit);
}

#[test]
fn never_exceeds_the_limit() {
    let mut fake = FakeInspector::default();
    let frames = vec![("X.y(X.java:1)", Some("file:/a/very/long/location/of/the/class/X.class")); 500];
    let ex = fake.add("java.lang.Error", &frames, None);

    let trace = render_stack_trace(&fake, "t", &ex, MAX_STACK_TRACE_LENGTH).unwrap();
    assert!(trace.len() <= MAX_STACK_TRACE_LENGTH);
    assert!(trace.ends_with('\n'));
}

#[test]
fn header_that_does_not_fit_gives_nothing() {
    let mut fake = FakeInspector::default();
    let ex = fake.add("java.lang.RuntimeException: a message that is far too long", &[], None);
    assert_eq!(render_stack_trace(&fake, "main", &ex, 20), None);
}

#[test]
fn missing_summary_gives_nothing() {
    let mut fake = FakeInspector::default();
    let ex = fake.add("x", &[], None);
    fake.throwables[ex].summary = None;
    assert_eq!(render_stack_trace(&fake, "main", &ex, MAX_STACK_TRACE_LENGTH), None);
}

#[test]
fn unreadable_frame_stops_output() {
    let mut fake = FakeInspector::default();
    let ex = fake.add("java.lang.Error", &[("A.a(A.java:1)", None), ("B.b(B.java:2)", None)], None);
    if let Some(frames) = fake.throwables[ex].frames.as_mut() {
        frames[1] = None;
    }

    let trace = render_stack_trace(&fake, "main", &ex, MAX_STACK_TRACE_LENGTH).unwrap();
    assert_eq!(trace, "Exception in thread \"main\" java.lang.Error\n\tat A.a(A.java:1) [unknown]\n");
}

#[test]
fn cyclic_cause_chain_is_bounded() {
    let mut fake = FakeInspector::default();
    let a = fake.add("A", &[("A.a(A.java:1)", None)], None);
    let b = fake.add("B", &[("B.b(B.java:1)", None)], Some(a));
    fake.throwables[a].cause = Some(b);

    let trace = render_stack_trace(&fake, "main", &a, 1_000).unwrap();
    assert!(trace.len() <= 1_000);
    assert!(trace.matches("Caused by: ").count() > 5);
}

#[test]
fn trace_buffer_rejects_partial_lines() {
    let mut buffer = TraceBuffer::new(10);
    assert!(buffer.try_push(&["abc", "de"]));
    assert_eq!(buffer.remaining(), 5);
    assert!(!buffer.try_push(&["123", "456"]));
    assert_eq!(buffer.len(), 5);
    assert!(buffer.try_push(&["12345"]));
    assert_eq!(buffer.into_string(), "abcde12345");
}
