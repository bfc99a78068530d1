//! Operator-facing activity log
//!
//! In-memory ring buffer of timestamped progress messages, polled by the
//! status API. Entries are mirrored to `tracing` so they also land in the
//! log files.

use std::collections::VecDeque;
use chrono::Local;
use parking_lot::Mutex;
use tracing::info;

/// Maximum number of retained entries before the oldest are dropped.
const MAX_ENTRIES: usize = 1000;

/// Shared activity log buffer.
pub struct ActivityLog {
    entries: Mutex<VecDeque<String>>,
}

impl ActivityLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(MAX_ENTRIES)),
        }
    }

    /// Append a message to the log.
    pub fn emit(&self, message: &str) {
        info!(target: "activity", "{}", message);

        let stamped = format!("[{}] {}", Local::now().format("%H:%M:%S"), message);
        let mut entries = self.entries.lock();
        entries.push_back(stamped);
        if entries.len() > MAX_ENTRIES {
            entries.pop_front();
        }
    }

    /// Append a message attributed to one profile.
    pub fn emit_for(&self, profile_index: u64, message: &str) {
        self.emit(&format!("[Profile {}] {}", profile_index, message));
    }

    /// Current number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Render the whole buffer as one newline-joined string.
    pub fn dump(&self) -> String {
        let entries = self.entries.lock();
        entries.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    /// Drop all retained entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_dump() {
        let log = ActivityLog::new();
        log.emit("first");
        log.emit_for(3, "second");

        let dump = log.dump();
        assert!(dump.contains("first"));
        assert!(dump.contains("[Profile 3] second"));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_ring_buffer_cap() {
        let log = ActivityLog::new();
        for i in 0..(MAX_ENTRIES + 50) {
            log.emit(&format!("entry {}", i));
        }
        assert_eq!(log.len(), MAX_ENTRIES);
        // oldest entries were dropped
        assert!(!log.dump().contains("entry 0\n"));
        assert!(log.dump().contains(&format!("entry {}", MAX_ENTRIES + 49)));
    }

    #[test]
    fn test_clear() {
        let log = ActivityLog::new();
        log.emit("something");
        log.clear();
        assert!(log.is_empty());
    }
}
