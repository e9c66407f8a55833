use chrono::Utc;
use std::cell::Cell;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::Event;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use super::{Diagnostics, LogLevel};

thread_local! {
    // Set while sinks run, so a callback that logs can't recurse.
    static IN_SINK: Cell<bool> = const { Cell::new(false) };
}

/// Clears `IN_SINK` on drop, including when a sink unwinds
struct SinkGuard;

impl SinkGuard {
    fn enter() -> Option<Self> {
        if IN_SINK.with(|flag| flag.replace(true)) {
            None
        } else {
            Some(SinkGuard)
        }
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        IN_SINK.with(|flag| flag.set(false));
    }
}

/// Tracing layer that formats events as lines for the diagnostics sinks
///
/// Line format: `<rfc3339 time> <LEVEL> <target>: <message> key=value ...`
pub struct DiagnosticsLayer {
    diagnostics: Arc<Diagnostics>,
}

impl DiagnosticsLayer {
    pub fn new(diagnostics: Arc<Diagnostics>) -> Self {
        Self { diagnostics }
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl tracing::field::Visit for LineVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

fn level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Off => "OFF",
        LogLevel::Error => "ERROR",
        LogLevel::Warning => "WARN",
        LogLevel::Info => "INFO",
        LogLevel::Verbose => "VERBOSE",
    }
}

impl<S> Layer<S> for DiagnosticsLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = LogLevel::from(event.metadata().level());
        if !self.diagnostics.is_enabled(level) {
            return;
        }
        let Some(_guard) = SinkGuard::enter() else {
            return;
        };

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = format!(
            "{} {} {}: {}{}",
            Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level_label(level),
            event.metadata().target(),
            visitor.message,
            visitor.fields
        );
        self.diagnostics.log(level, &line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    #[test]
    fn test_events_reach_memory_sink() {
        let diagnostics = Diagnostics::new();
        diagnostics.memory().start();
        let subscriber = tracing_subscriber::registry().with(diagnostics.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(utterance = 3, "network: connected");
            tracing::debug!("too verbose for the default threshold");
        });

        let lines = diagnostics.memory().dump_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].contains("network: connected"));
        assert!(lines[0].contains("utterance=3"));
    }

    #[test]
    fn test_logging_callback_does_not_recurse() {
        let diagnostics = Diagnostics::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        diagnostics.callback().set_callback(Some(Arc::new(move |line: &str| {
            tracing::warn!("callback saw a line");
            sink.lock().push(line.to_string());
        })));

        let subscriber = tracing_subscriber::registry().with(diagnostics.layer());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("hello");
        });

        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_guard_clears_flag_on_unwind() {
        let unwound = std::panic::catch_unwind(|| {
            let _guard = SinkGuard::enter().unwrap();
            assert!(SinkGuard::enter().is_none());
            panic!("sink failed");
        });
        assert!(unwound.is_err());
        assert!(SinkGuard::enter().is_some());
    }
}
