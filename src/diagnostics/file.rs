use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{DiagnosticsError, Filters};

struct OpenLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

/// Appends log lines to a file
#[derive(Default)]
pub struct FileSink {
    log: Mutex<Option<OpenLog>>,
    filters: Filters,
}

impl FileSink {
    /// Start logging to `path`, truncating it unless `append` is set
    ///
    /// Starting while already started switches to the new file; the old one
    /// is flushed and closed first.
    pub fn start(&self, path: impl AsRef<Path>, append: bool) -> Result<(), DiagnosticsError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .map_err(|source| DiagnosticsError::Open {
                path: path.clone(),
                source,
            })?;

        let mut log = self.log.lock();
        if let Some(mut previous) = log.take() {
            previous.writer.flush()?;
        }
        *log = Some(OpenLog {
            path,
            writer: BufWriter::new(file),
        });
        Ok(())
    }

    /// Flush and close the file; no-op when not started
    pub fn stop(&self) {
        if let Some(mut log) = self.log.lock().take() {
            // Nowhere left to report a failed flush.
            let _ = log.writer.flush();
        }
    }

    pub fn is_started(&self) -> bool {
        self.log.lock().is_some()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.log.lock().as_ref().map(|log| log.path.clone())
    }

    /// Keep only lines containing one of `filters`; empty clears filtering
    pub fn set_filters<I, S>(&self, filters: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.set(filters);
    }

    pub fn filters(&self) -> Vec<String> {
        self.filters.get()
    }

    pub(crate) fn write_line(&self, line: &str) {
        if !self.filters.matches(line) {
            return;
        }
        let mut log = self.log.lock();
        if let Some(log) = log.as_mut() {
            let _ = writeln!(log.writer, "{}", line).and_then(|_| log.writer.flush());
        }
    }
}
