use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{DiagnosticsError, Filters};

/// Ring capacity in bytes of line text
pub const DEFAULT_MEMORY_CAPACITY: usize = 2 * 1024 * 1024;

struct Ring {
    lines: VecDeque<String>,
    bytes: usize,
    capacity: usize,
}

impl Ring {
    fn push(&mut self, line: &str) {
        if line.len() > self.capacity {
            // The newest line alone overflows; nothing older may be kept.
            self.lines.clear();
            self.bytes = 0;
            return;
        }
        while self.bytes + line.len() > self.capacity {
            match self.lines.pop_front() {
                Some(old) => self.bytes -= old.len(),
                None => break,
            }
        }
        self.bytes += line.len();
        self.lines.push_back(line.to_string());
    }
}

/// Bounded in-memory ring of recent log lines
///
/// The oldest lines are evicted once the total size would exceed the
/// capacity. Dumps copy the ring under the lock and write outside it.
pub struct MemorySink {
    ring: Mutex<Ring>,
    started: AtomicBool,
    filters: Filters,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                lines: VecDeque::new(),
                bytes: 0,
                capacity,
            }),
            started: AtomicBool::new(false),
            filters: Filters::default(),
        }
    }

    /// Start capturing; no-op when already started
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    /// Stop capturing; the buffered lines are kept for dumping
    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn set_filters<I, S>(&self, filters: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.set(filters);
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity
    }

    /// Bytes of line text currently buffered
    pub fn len_bytes(&self) -> usize {
        self.ring.lock().bytes
    }

    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.lines.clear();
        ring.bytes = 0;
    }

    pub fn dump_lines(&self) -> Vec<String> {
        self.ring.lock().lines.iter().cloned().collect()
    }

    pub fn dump_to_writer<W: Write>(&self, mut writer: W) -> Result<(), DiagnosticsError> {
        for line in self.dump_lines() {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn dump_to_file(&self, path: impl AsRef<Path>) -> Result<(), DiagnosticsError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| DiagnosticsError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.dump_to_writer(BufWriter::new(file))
    }

    pub(crate) fn write_line(&self, line: &str) {
        if !self.is_started() || !self.filters.matches(line) {
            return;
        }
        self.ring.lock().push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_evicts_oldest() {
        let sink = MemorySink::new(10);
        sink.start();
        sink.write_line("aaaa");
        sink.write_line("bbbb");
        sink.write_line("cccc");

        assert_eq!(sink.dump_lines(), vec!["bbbb".to_string(), "cccc".to_string()]);
        assert_eq!(sink.len_bytes(), 8);
    }

    #[test]
    fn test_oversized_line_empties_ring() {
        let sink = MemorySink::new(4);
        sink.start();
        sink.write_line("ab");
        sink.write_line("too long");
        assert!(sink.dump_lines().is_empty());
        assert_eq!(sink.len_bytes(), 0);
    }

    #[test]
    fn test_stopped_sink_ignores_lines() {
        let sink = MemorySink::new(64);
        sink.write_line("before start");
        sink.start();
        sink.write_line("captured");
        sink.stop();
        sink.write_line("after stop");
        assert_eq!(sink.dump_lines(), vec!["captured".to_string()]);
    }
}
