//! Diagnostic log sinks
//!
//! A [`Diagnostics`] context owns three independent sinks (file, in-memory
//! ring and callback) and one severity threshold shared by all of them. It is
//! constructed explicitly and fed from `tracing` through [`DiagnosticsLayer`],
//! so every recognizer in the process writes into the same sinks.

mod callback;
mod file;
mod layer;
mod memory;

pub use callback::{CallbackSink, LogCallback};
pub use file::FileSink;
pub use layer::DiagnosticsLayer;
pub use memory::{MemorySink, DEFAULT_MEMORY_CAPACITY};

use parking_lot::RwLock;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DiagnosticsError {
    #[error("Failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Diagnostics I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Severity threshold shared by all sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warning,
    #[default]
    Info,
    Verbose,
}

impl LogLevel {
    /// Whether a line of `level` passes this threshold
    pub fn allows(self, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= self
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::INFO => LogLevel::Info,
            _ => LogLevel::Verbose,
        }
    }
}

/// Substring filters of one sink; an empty set passes everything
#[derive(Debug, Default)]
pub(crate) struct Filters {
    patterns: RwLock<Vec<String>>,
}

impl Filters {
    pub fn set<I, S>(&self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.patterns.write() = patterns
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .collect();
    }

    pub fn matches(&self, line: &str) -> bool {
        let patterns = self.patterns.read();
        patterns.is_empty() || patterns.iter().any(|p| line.contains(p.as_str()))
    }

    pub fn get(&self) -> Vec<String> {
        self.patterns.read().clone()
    }
}

pub struct Diagnostics {
    level: RwLock<LogLevel>,
    file: FileSink,
    memory: MemorySink,
    callback: CallbackSink,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::with_memory_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl Diagnostics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Context whose memory ring holds `capacity` bytes of lines
    pub fn with_memory_capacity(capacity: usize) -> Self {
        Self {
            level: RwLock::new(LogLevel::default()),
            file: FileSink::default(),
            memory: MemorySink::new(capacity),
            callback: CallbackSink::default(),
        }
    }

    pub fn level(&self) -> LogLevel {
        *self.level.read()
    }

    pub fn set_level(&self, level: LogLevel) {
        *self.level.write() = level;
    }

    pub fn file(&self) -> &FileSink {
        &self.file
    }

    pub fn memory(&self) -> &MemorySink {
        &self.memory
    }

    pub fn callback(&self) -> &CallbackSink {
        &self.callback
    }

    /// At least one sink is running and `level` passes the threshold
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.level().allows(level)
            && (self.file.is_started() || self.memory.is_started() || self.callback.is_set())
    }

    /// Offer one formatted line to every sink
    pub fn log(&self, level: LogLevel, line: &str) {
        if !self.level().allows(level) {
            return;
        }
        self.file.write_line(line);
        self.memory.write_line(line);
        self.callback.write_line(line);
    }

    /// Stop every sink; the memory ring keeps its contents
    pub fn shutdown(&self) {
        self.file.stop();
        self.memory.stop();
        self.callback.set_callback(None);
    }

    pub fn layer(self: &Arc<Self>) -> DiagnosticsLayer {
        DiagnosticsLayer::new(Arc::clone(self))
    }
}
