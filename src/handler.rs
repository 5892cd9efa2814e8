use crate::engine::{Target, WriteEngine};
use crate::error::LogError;
use crate::file::{FileHandler, SizeRotatingFileHandler, TimeRotatingFileHandler, When};
use crate::formatter::{self, Formatter};
use crate::net::{NetConfig, NetHandler};
use crate::record::Record;
use crate::sink::Sink;
use crate::stream::StreamHandler;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Sink slot shared between a [`Handler`] and the jobs it has queued.
pub type SharedSink = Arc<Mutex<Box<dyn Sink>>>;

/// A named output: a [`Sink`], the [`Formatter`] applied to records bound
/// for it, and the [`WriteEngine`] that performs its writes.
///
/// Handlers start with the text-line formatter.
pub struct Handler {
    name: Arc<str>,
    sink: SharedSink,
    formatter: Arc<dyn Formatter>,
    engine: WriteEngine,
}

impl Handler {
    pub fn new(name: impl Into<String>, sink: impl Sink + 'static, engine: &WriteEngine) -> Self {
        Self::from_boxed(name.into(), Box::new(sink), engine)
    }

    fn from_boxed(name: String, sink: Box<dyn Sink>, engine: &WriteEngine) -> Self {
        Handler {
            name: Arc::from(name),
            sink: Arc::new(Mutex::new(sink)),
            formatter: formatter::text(),
            engine: engine.clone(),
        }
    }

    pub fn stdout(engine: &WriteEngine) -> Self {
        Self::new("stdout", StreamHandler::stdout(), engine)
    }

    pub fn stderr(engine: &WriteEngine) -> Self {
        Self::new("stderr", StreamHandler::stderr(), engine)
    }

    pub fn file(path: impl AsRef<Path>, engine: &WriteEngine) -> Result<Self, LogError> {
        let sink = FileHandler::open(path)?;
        Ok(Self::new(sink.describe(), sink, engine))
    }

    pub fn size_rotating(
        path: impl AsRef<Path>,
        max_bytes: u64,
        backup_count: u32,
        engine: &WriteEngine,
    ) -> Result<Self, LogError> {
        let sink = SizeRotatingFileHandler::open(path, max_bytes, backup_count)?;
        Ok(Self::new(sink.describe(), sink, engine))
    }

    pub fn time_rotating(
        path: impl AsRef<Path>,
        when: When,
        multiplier: u32,
        engine: &WriteEngine,
    ) -> Result<Self, LogError> {
        let sink = TimeRotatingFileHandler::open(path, when, multiplier)?;
        Ok(Self::new(sink.describe(), sink, engine))
    }

    pub fn net(config: NetConfig, engine: &WriteEngine) -> Self {
        let sink = NetHandler::new(config);
        Self::new(sink.describe(), sink, engine)
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formatter(&self) -> &Arc<dyn Formatter> {
        &self.formatter
    }

    pub fn set_formatter(&mut self, formatter: Arc<dyn Formatter>) {
        self.formatter = formatter;
    }

    pub fn engine(&self) -> &WriteEngine {
        &self.engine
    }

    /// Route future writes through a different engine, e.g. a dedicated
    /// one for a slow network destination.
    pub fn set_engine(&mut self, engine: &WriteEngine) {
        self.engine = engine.clone();
    }

    /// Hand `record` to the engine. Never blocks; see
    /// [`WriteEngine::enqueue`] for drop semantics.
    pub fn async_write(&self, record: Arc<Record>) {
        self.engine
            .enqueue(self, Arc::clone(&self.formatter), record);
    }

    /// Write bytes straight to the sink on the calling thread, bypassing
    /// the engine.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.sink.lock().write(buf)
    }

    /// Flush and release the sink's descriptor or connection.
    pub fn close(&self) -> io::Result<()> {
        let mut sink = self.sink.lock();
        let flushed = sink.flush();
        sink.close().and(flushed)
    }

    /// Same configuration with its own, freshly opened sink.
    pub fn try_clone(&self) -> Result<Handler, LogError> {
        let sink = self.sink.lock().try_clone()?;
        Ok(Handler {
            name: Arc::clone(&self.name),
            sink: Arc::new(Mutex::new(sink)),
            formatter: Arc::clone(&self.formatter),
            engine: self.engine.clone(),
        })
    }

    pub(crate) fn target(&self) -> Target {
        Target::new(Arc::clone(&self.name), Arc::clone(&self.sink))
    }

    /// True when both handlers write through the same sink slot.
    pub fn shares_sink_with(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.sink, &other.sink)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("formatter", &self.formatter.name())
            .field("engine", &self.engine.name())
            .finish()
    }
}
