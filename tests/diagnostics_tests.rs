use parking_lot::Mutex;
use speech_session::diagnostics::{Diagnostics, LogLevel, DEFAULT_MEMORY_CAPACITY};
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::prelude::*;

#[test]
fn test_memory_ring_keeps_most_recent_suffix() {
    let diagnostics = Diagnostics::new();
    let memory = diagnostics.memory();
    memory.start();
    assert_eq!(memory.capacity(), DEFAULT_MEMORY_CAPACITY);

    // Lines of varying length, well past 2 MiB in total
    let written: Vec<String> = (0..40_000)
        .map(|i| format!("line {:06} {}", i, "x".repeat(i % 97)))
        .collect();
    for line in &written {
        diagnostics.log(LogLevel::Info, line);
    }

    let dump = memory.dump_lines();
    let total: usize = dump.iter().map(|l| l.len()).sum();
    assert!(total <= DEFAULT_MEMORY_CAPACITY);
    assert_eq!(total, memory.len_bytes());

    // The dump is exactly the newest lines, and no older line would have fit
    let suffix = &written[written.len() - dump.len()..];
    assert_eq!(dump.as_slice(), suffix);
    let next_older = &written[written.len() - dump.len() - 1];
    assert!(total + next_older.len() > DEFAULT_MEMORY_CAPACITY);
}

#[test]
fn test_memory_dump_is_non_destructive() {
    let diagnostics = Diagnostics::new();
    diagnostics.memory().start();
    diagnostics.log(LogLevel::Error, "first");
    diagnostics.log(LogLevel::Warning, "second");

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.log");
    diagnostics.memory().dump_to_file(&path).unwrap();

    let mut buffer = Vec::new();
    diagnostics.memory().dump_to_writer(&mut buffer).unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    assert_eq!(String::from_utf8(buffer).unwrap(), "first\nsecond\n");
    assert_eq!(diagnostics.memory().dump_lines().len(), 2);
}

#[test]
fn test_file_sink_filters() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.log");
    let diagnostics = Diagnostics::new();

    diagnostics.file().start(&path, false).unwrap();
    diagnostics.file().set_filters(["network"]);
    diagnostics.log(LogLevel::Info, "network: connecting");
    diagnostics.log(LogLevel::Info, "audio: frame dropped");
    diagnostics.log(LogLevel::Info, "network: connected");

    diagnostics.file().set_filters(Vec::<String>::new());
    diagnostics.log(LogLevel::Info, "audio: capture started");
    diagnostics.file().stop();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(
        lines,
        vec![
            "network: connecting",
            "network: connected",
            "audio: capture started"
        ]
    );
}

#[test]
fn test_file_sink_append_and_truncate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.log");
    let diagnostics = Diagnostics::new();

    diagnostics.file().start(&path, false).unwrap();
    diagnostics.log(LogLevel::Info, "one");
    diagnostics.file().stop();

    diagnostics.file().start(&path, true).unwrap();
    assert_eq!(diagnostics.file().path(), Some(path.clone()));
    diagnostics.log(LogLevel::Info, "two");
    diagnostics.file().stop();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");

    diagnostics.file().start(&path, false).unwrap();
    diagnostics.log(LogLevel::Info, "three");
    diagnostics.file().stop();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "three\n");

    // Stopped sinks drop lines; stop is idempotent
    diagnostics.log(LogLevel::Info, "four");
    diagnostics.file().stop();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "three\n");
}

#[test]
fn test_file_sink_bad_path() {
    let diagnostics = Diagnostics::new();
    let result = diagnostics.file().start("/nonexistent/dir/engine.log", false);
    assert!(result.is_err());
    assert!(!diagnostics.file().is_started());
}

#[test]
fn test_callback_sink_replace_and_clear() {
    let diagnostics = Diagnostics::new();
    let first = Arc::new(Mutex::new(Vec::<String>::new()));
    let second = Arc::new(Mutex::new(Vec::<String>::new()));

    let sink = Arc::clone(&first);
    diagnostics
        .callback()
        .set_callback(Some(Arc::new(move |line: &str| sink.lock().push(line.to_string()))));
    diagnostics.log(LogLevel::Info, "a");

    let sink = Arc::clone(&second);
    diagnostics
        .callback()
        .set_callback(Some(Arc::new(move |line: &str| sink.lock().push(line.to_string()))));
    diagnostics.callback().set_filters(["keep"]);
    diagnostics.log(LogLevel::Info, "b");
    diagnostics.log(LogLevel::Info, "keep c");

    diagnostics.callback().set_callback(None);
    diagnostics.log(LogLevel::Info, "keep d");

    assert_eq!(*first.lock(), vec!["a".to_string()]);
    assert_eq!(*second.lock(), vec!["keep c".to_string()]);
}

#[test]
fn test_sinks_are_independent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.log");
    let diagnostics = Diagnostics::new();
    diagnostics.file().start(&path, false).unwrap();
    diagnostics.memory().start();
    diagnostics.memory().set_filters(["memory-only"]);

    diagnostics.log(LogLevel::Info, "memory-only line");
    diagnostics.log(LogLevel::Info, "plain line");
    diagnostics.file().stop();

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "memory-only line\nplain line\n"
    );
    assert_eq!(
        diagnostics.memory().dump_lines(),
        vec!["memory-only line".to_string()]
    );
}

#[test]
fn test_tracing_events_reach_sinks_with_threshold() {
    let diagnostics = Diagnostics::new();
    diagnostics.memory().start();
    diagnostics.set_level(LogLevel::Verbose);

    let subscriber = tracing_subscriber::registry().with(diagnostics.layer());
    tracing::subscriber::with_default(subscriber, || {
        tracing::debug!("network: verbose detail");
        diagnostics.set_level(LogLevel::Error);
        tracing::warn!("network: dropped by threshold");
        tracing::error!("network: failed");
        diagnostics.set_level(LogLevel::Off);
        tracing::error!("network: nothing passes Off");
    });

    let lines = diagnostics.memory().dump_lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("VERBOSE") && lines[0].contains("network: verbose detail"));
    assert!(lines[1].contains("ERROR") && lines[1].contains("network: failed"));
}

#[test]
fn test_panicking_callback_keeps_logging_alive() {
    let diagnostics = Diagnostics::new();
    diagnostics.memory().start();
    diagnostics
        .callback()
        .set_callback(Some(Arc::new(|line: &str| {
            if line.contains("boom") {
                panic!("callback failed");
            }
        })));

    let subscriber = tracing_subscriber::registry().with(diagnostics.layer());
    let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("boom");
            diagnostics.callback().set_callback(None);
            tracing::info!("after the panic");
        });
    }));
    assert!(unwound.is_ok(), "callback panic reached the logging call site");

    let lines = diagnostics.memory().dump_lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("boom"));
    assert!(lines[1].ends_with("after the panic"));
}
