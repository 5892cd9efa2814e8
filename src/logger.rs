//! The logging façade.
//!
//! A [`Logger`] filters by level, turns a call into a pooled [`Record`](crate::record::Record)
//! and hands that record to each of its handlers. Nothing here touches a
//! file or socket; that happens on the write engine's worker.

use crate::error::LogError;
use crate::formatter::{self, Formatter};
use crate::handler::Handler;
use crate::level::{Flags, Level};
use crate::record::{Fields, RecordPool, DEFAULT_MAX_MESSAGE_BYTES};
use parking_lot::RwLock;
use std::fmt::{self, Write as _};
use std::io;
use std::panic::Location;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

// Number of trailing path components kept in the source prefix.
const SOURCE_DEPTH: usize = 3;

/// Level-filtered entry point that fans records out to its handlers.
///
/// Handlers are written in the order they were added. A logger created
/// with [`with_field`](Logger::with_field) or
/// [`with_fields`](Logger::with_fields) owns clones of the parent's
/// handlers that always emit JSON.
pub struct Logger {
    name: String,
    level: AtomicU8,
    flags: Flags,
    handlers: RwLock<Vec<Handler>>,
    fields: Option<Arc<Fields>>,
    pool: Arc<RecordPool>,
    max_message_bytes: usize,
}

/// Configures a [`Logger`].
pub struct LoggerBuilder {
    name: String,
    level: Level,
    flags: Flags,
    handlers: Vec<Handler>,
    fields: Fields,
    pool: Option<Arc<RecordPool>>,
    max_message_bytes: usize,
}

impl LoggerBuilder {
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn handler(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Attach fields. Every handler is switched to JSON output.
    pub fn fields(mut self, fields: Fields) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Pool records are taken from. Defaults to the first handler's
    /// engine pool.
    pub fn pool(mut self, pool: Arc<RecordPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn max_message_bytes(mut self, max_message_bytes: usize) -> Self {
        self.max_message_bytes = max_message_bytes;
        self
    }

    pub fn build(self) -> Result<Logger, LogError> {
        if self.max_message_bytes == 0 {
            return Err(LogError::InvalidMaxBytes);
        }
        Ok(self.finish())
    }

    // Callers must have a non-zero `max_message_bytes`.
    pub(crate) fn finish(self) -> Logger {
        let pool = match self.pool {
            Some(pool) => pool,
            None => self
                .handlers
                .first()
                .map(|handler| Arc::clone(handler.engine().pool()))
                .unwrap_or_default(),
        };

        let (handlers, fields) = if self.fields.is_empty() {
            (self.handlers, None)
        } else {
            let handlers = self
                .handlers
                .into_iter()
                .map(|handler| handler.with_formatter(formatter::json()))
                .collect();
            (handlers, Some(Arc::new(self.fields)))
        };

        Logger {
            name: self.name,
            level: AtomicU8::new(self.level as u8),
            flags: self.flags,
            handlers: RwLock::new(handlers),
            fields,
            pool,
            max_message_bytes: self.max_message_bytes,
        }
    }
}

impl Logger {
    pub fn builder(name: impl Into<String>) -> LoggerBuilder {
        LoggerBuilder {
            name: name.into(),
            level: Level::default(),
            flags: Flags::STD,
            handlers: Vec::new(),
            fields: Fields::new(),
            pool: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// Whether a record at `level` would be built at all.
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.level()
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn fields(&self) -> Option<&Fields> {
        self.fields.as_deref()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.handlers
            .read()
            .iter()
            .map(|handler| handler.name().to_string())
            .collect()
    }

    /// Replace the first handler, or add one if there is none.
    pub fn set_handler(&self, handler: Handler) {
        let mut handlers = self.handlers.write();
        match handlers.first_mut() {
            Some(first) => *first = handler,
            None => handlers.push(handler),
        }
    }

    pub fn append_handler(&self, handler: Handler) {
        self.handlers.write().push(handler);
    }

    /// Use `formatter` for every handler.
    pub fn set_formatter(&self, formatter: Arc<dyn Formatter>) {
        for handler in self.handlers.write().iter_mut() {
            handler.set_formatter(Arc::clone(&formatter));
        }
    }

    /// A child logger carrying one more field. See
    /// [`with_fields`](Logger::with_fields).
    pub fn with_field(
        &self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<Logger, LogError> {
        let mut fields = Fields::new();
        fields.insert(key.into(), value.into());
        self.with_fields(fields)
    }

    /// A child logger whose records carry this logger's fields merged
    /// with `fields` (new values win).
    ///
    /// Each handler is cloned with its own sink and switched to JSON.
    /// The parent is left untouched.
    pub fn with_fields(&self, fields: Fields) -> Result<Logger, LogError> {
        let handlers = self
            .handlers
            .read()
            .iter()
            .map(|handler| Ok(handler.try_clone()?.with_formatter(formatter::json())))
            .collect::<Result<Vec<_>, LogError>>()?;

        let mut merged = self.fields.as_deref().cloned().unwrap_or_default();
        merged.extend(fields);

        Ok(Logger {
            name: self.name.clone(),
            level: AtomicU8::new(self.level.load(Ordering::Relaxed)),
            flags: self.flags,
            handlers: RwLock::new(handlers),
            fields: Some(Arc::new(merged)),
            pool: Arc::clone(&self.pool),
            max_message_bytes: self.max_message_bytes,
        })
    }

    /// Log `args` at `level`, attributed to the caller's source location.
    ///
    /// Returns before anything is allocated or formatted when `level` is
    /// below the logger's level.
    #[track_caller]
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        let caller = Location::caller();
        self.dispatch(level, Some((caller.file(), caller.line())), |message| {
            let _ = message.write_fmt(args);
        });
    }

    /// Log an already rendered message with an explicit source location.
    /// Used by bridges from other logging facades.
    pub fn log_event(&self, level: Level, file: Option<&str>, line: Option<u32>, message: &str) {
        if !self.enabled(level) {
            return;
        }
        let location = file.map(|file| (file, line.unwrap_or(0)));
        self.dispatch(level, location, |buf| buf.push_str(message));
    }

    #[track_caller]
    pub fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Trace, args);
    }

    #[track_caller]
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    #[track_caller]
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    #[track_caller]
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    #[track_caller]
    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    /// Logs at FATAL. The process keeps running.
    #[track_caller]
    pub fn fatal(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Fatal, args);
    }

    /// Business audit line.
    #[track_caller]
    pub fn buss(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Buss, args);
    }

    fn dispatch(&self, level: Level, location: Option<(&str, u32)>, message: impl FnOnce(&mut String)) {
        let handlers = self.handlers.read();
        if handlers.is_empty() {
            return;
        }

        let mut record = self.pool.acquire();
        record.level = level;
        record.flags = self.flags;
        if self.flags.contains(Flags::TIME) {
            let _ = write!(record.timestamp, "{}", chrono::Local::now().format(TIME_FORMAT));
        }
        if let (true, Some((file, line))) = (self.flags.contains(Flags::SOURCE), location) {
            write_source(&mut record.source, file, line);
        }
        message(&mut record.message);
        record.clamp_message(self.max_message_bytes);
        record.fields = self.fields.clone();

        let record = Arc::new(record);
        for handler in handlers.iter() {
            handler.async_write(Arc::clone(&record));
        }
        self.pool.release_shared(record);
    }

    /// Flush and close every handler. The first error is returned after
    /// all handlers have been attempted.
    pub fn close(&self) -> io::Result<()> {
        self.handlers
            .read()
            .iter()
            .map(Handler::close)
            .fold(Ok(()), |result, closed| result.and(closed))
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level())
            .field("handlers", &self.handler_names())
            .field("fields", &self.fields)
            .finish()
    }
}

/// `dir/module/file.rs:[line]`, keeping the last three path components.
pub(crate) fn write_source(out: &mut String, file: &str, line: u32) {
    let short = file
        .rmatch_indices(['/', '\\'])
        .nth(SOURCE_DEPTH - 1)
        .map_or(file, |(idx, _)| &file[idx + 1..]);
    let _ = write!(out, "{short}:[{line}]");
}

/// Log through a [`Logger`] at an explicit [`Level`].
///
/// ```ignore
/// log_pipeline::log!(logger, Level::Warn, "queue at {}%", pct);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log($level, ::std::format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! trace {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::Trace, $($arg)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::Debug, $($arg)+)
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::Info, $($arg)+)
    };
}

#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::Warn, $($arg)+)
    };
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::Error, $($arg)+)
    };
}

#[macro_export]
macro_rules! fatal {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::Fatal, $($arg)+)
    };
}

#[macro_export]
macro_rules! buss {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::Buss, $($arg)+)
    };
}
