use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

use super::Filters;

pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Forwards log lines to one application callback
///
/// The callback runs on whichever task produced the line and must return
/// quickly. A panicking callback loses that line only.
#[derive(Default)]
pub struct CallbackSink {
    callback: RwLock<Option<LogCallback>>,
    filters: Filters,
}

impl CallbackSink {
    /// Replace the callback; `None` clears it
    pub fn set_callback(&self, callback: Option<LogCallback>) {
        *self.callback.write() = callback;
    }

    pub fn is_set(&self) -> bool {
        self.callback.read().is_some()
    }

    pub fn set_filters<I, S>(&self, filters: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.set(filters);
    }

    pub(crate) fn write_line(&self, line: &str) {
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            if self.filters.matches(line) && catch_unwind(AssertUnwindSafe(|| callback(line))).is_err() {
                error!("Log callback panicked");
            }
        }
    }
}
