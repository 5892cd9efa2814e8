use crate::level::{Flags, Level};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Structured fields attached to a logger with
/// [`Logger::with_fields`](crate::logger::Logger::with_fields).
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Default upper bound for the message part of a record, in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 3 * 1024;

/// Replaces `\n` and `\r` so that one record always stays one line.
pub const LINE_BREAK_REPLACEMENT: &str = "||";

const DEFAULT_POOL_IDLE: usize = 1024;

/// One log event, ready to be formatted.
///
/// Records are pooled: a [`Logger`](crate::logger::Logger) takes one from
/// a [`RecordPool`], fills it and shares it read-only between the jobs it
/// enqueues. The last job to finish formatting hands it back.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Record {
    pub level: Level,
    pub timestamp: String,
    pub source: String,
    pub message: String,
    #[serde(skip)]
    pub flags: Flags,
    #[serde(skip)]
    pub fields: Option<Arc<Fields>>,
}

impl Record {
    /// Build a standalone record, mostly useful for tests and custom
    /// producers that bypass [`Logger`](crate::logger::Logger).
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Record {
            level,
            message: message.into(),
            flags: Flags::empty(),
            ..Record::default()
        }
    }

    /// Enforce the one-record-one-line and maximum-size rules on
    /// `message`.
    ///
    /// A message longer than `max_bytes` keeps its first `max_bytes`
    /// bytes (rounded down to a char boundary) followed by
    /// `... data too long, source-length=<original length>`.
    pub fn clamp_message(&mut self, max_bytes: usize) {
        let len = self.message.len();
        if len > max_bytes {
            let mut cut = max_bytes;
            while !self.message.is_char_boundary(cut) {
                cut -= 1;
            }
            self.message.truncate(cut);
            let _ = write!(self.message, "... data too long, source-length={len}");
        }

        if self.message.contains(['\n', '\r']) {
            self.message = self.message.replace(['\n', '\r'], LINE_BREAK_REPLACEMENT);
        }
    }

    /// Reset every field while keeping string capacity for reuse.
    fn clear(&mut self) {
        self.level = Level::default();
        self.timestamp.clear();
        self.source.clear();
        self.message.clear();
        self.flags = Flags::empty();
        self.fields = None;
    }
}

/// Free list of [`Record`]s shared by producers and write workers.
///
/// A miss simply allocates. The free list is capped so a burst does not
/// pin memory forever.
#[derive(Debug)]
pub struct RecordPool {
    free: Mutex<Vec<Record>>,
    max_idle: usize,
}

impl RecordPool {
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_POOL_IDLE)
    }

    pub fn with_max_idle(max_idle: usize) -> Self {
        RecordPool {
            free: Mutex::new(Vec::with_capacity(max_idle.min(64))),
            max_idle,
        }
    }

    /// Take a cleared record, allocating if the free list is empty.
    pub fn acquire(&self) -> Record {
        self.free.lock().pop().unwrap_or_default()
    }

    /// Return a record. The caller must not keep any reference to it.
    pub fn release(&self, mut record: Record) {
        record.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(record);
        }
    }

    /// Return a shared record if `record` is the last reference to it.
    /// Otherwise only this reference is dropped.
    pub fn release_shared(&self, record: Arc<Record>) {
        if let Some(record) = Arc::into_inner(record) {
            self.release(record);
        }
    }

    /// Number of idle records currently held.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_at_limit_is_untouched() {
        let mut record = Record::new(Level::Info, "a".repeat(16));
        record.clamp_message(16);
        assert_eq!(record.message, "a".repeat(16));
    }

    #[test]
    fn long_message_is_truncated_with_length_suffix() {
        let mut record = Record::new(Level::Info, "b".repeat(20));
        record.clamp_message(16);
        assert_eq!(
            record.message,
            format!("{}... data too long, source-length=20", "b".repeat(16))
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // "é" is two bytes; cutting at 3 would split the second one.
        let mut record = Record::new(Level::Info, "ééé");
        record.clamp_message(3);
        assert!(record.message.starts_with("é..."));
        assert!(record.message.ends_with("source-length=6"));
    }

    #[test]
    fn line_breaks_are_replaced() {
        let mut record = Record::new(Level::Info, "one\ntwo\r\nthree");
        record.clamp_message(DEFAULT_MAX_MESSAGE_BYTES);
        assert_eq!(record.message, "one||two||||three");
    }

    #[test]
    fn pool_reuses_cleared_records() {
        let pool = RecordPool::new();
        let mut record = pool.acquire();
        record.message.push_str("hello");
        record.fields = Some(Arc::new(Fields::new()));
        pool.release(record);
        assert_eq!(pool.idle(), 1);

        let record = pool.acquire();
        assert!(record.message.is_empty());
        assert!(record.fields.is_none());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn release_shared_only_reclaims_last_reference() {
        let pool = RecordPool::new();
        let first = Arc::new(Record::new(Level::Warn, "x"));
        let second = Arc::clone(&first);

        pool.release_shared(first);
        assert_eq!(pool.idle(), 0);
        pool.release_shared(second);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn pool_is_capped() {
        let pool = RecordPool::with_max_idle(2);
        for _ in 0..5 {
            pool.release(Record::default());
        }
        assert_eq!(pool.idle(), 2);
    }
}
