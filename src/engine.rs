//! The single-worker write engine.
//!
//! Producers push `(handler, formatter, record)` jobs into a bounded
//! queue without ever blocking. One worker thread per engine pulls jobs,
//! formats them into an in-memory buffer and flushes that buffer to the
//! job's sink. Because the worker is the only writer to every sink it
//! serves, jobs bound for the same handler are written in enqueue order
//! and a sink's rotation check and write cannot interleave with another
//! write.

use crate::diag::{self, ErrorSampler};
use crate::error::LogError;
use crate::formatter::{Formatter, TextLineFormatter};
use crate::handler::{Handler, SharedSink};
use crate::limiter::RateLimiter;
use crate::record::{Record, RecordPool};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// Queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4 * 1024;

/// How long `close` lets the worker drain before dropping what is left.
pub const MAX_WAIT_ON_CLOSE: Duration = Duration::from_secs(10);

// 8k in memory, flushed at 4k to line up with a typical fs block.
const WRITE_BUFFER_CAPACITY: usize = 8 * 1024;
const FLUSH_THRESHOLD: usize = 4 * 1024;

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const STOPPED: u8 = 2;

/// Lifecycle of a [`WriteEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Running,
    /// `close` was called; the worker is flushing what is queued.
    Draining,
    Stopped,
}

/// Passed to drop and rate-limit callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dropped {
    /// Records lost in this event.
    pub count: u64,
    /// Running total for the engine, including this event.
    pub total: u64,
}

/// Invoked with the lost record (or the first of several) and the counts.
pub type DropCallback = Arc<dyn Fn(&Record, Dropped) + Send + Sync>;

/// Point-in-time copy of an engine's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub name: String,
    pub state: EngineState,
    /// Every `enqueue` call.
    pub submitted: u64,
    /// Jobs that made it into the queue.
    pub accepted: u64,
    /// Records whose bytes reached their sink.
    pub written: u64,
    /// Queue full, engine closed, or left over at shutdown.
    pub dropped: u64,
    /// Rejected by the rate limiter.
    pub rate_limited: u64,
    pub format_errors: u64,
    pub write_errors: u64,
}

/// Destination of a job: the handler's name and sink slot.
#[derive(Clone)]
pub(crate) struct Target {
    name: Arc<str>,
    sink: SharedSink,
}

impl Target {
    pub(crate) fn new(name: Arc<str>, sink: SharedSink) -> Self {
        Target { name, sink }
    }

    fn same_sink(&self, other: &Target) -> bool {
        Arc::ptr_eq(&self.sink, &other.sink)
    }
}

struct Job {
    target: Target,
    formatter: Arc<dyn Formatter>,
    record: Arc<Record>,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    accepted: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
    rate_limited: AtomicU64,
    format_errors: AtomicU64,
    write_errors: AtomicU64,
}

/// State visible to both producers and the worker.
struct Shared {
    name: String,
    state: AtomicU8,
    counters: Counters,
    on_drop: RwLock<Option<DropCallback>>,
    on_limit: RwLock<Option<DropCallback>>,
    limiter: RwLock<Option<Arc<RateLimiter>>>,
    pool: Arc<RecordPool>,
    sampler: ErrorSampler,
    max_wait: Duration,
    deadline: Mutex<Option<Instant>>,
    /// Locked by the worker for each receive and by `close` when it takes
    /// over the backlog of a stalled worker.
    queue: Mutex<mpsc::Receiver<Job>>,
}

impl Shared {
    fn state(&self) -> EngineState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => EngineState::Running,
            DRAINING => EngineState::Draining,
            _ => EngineState::Stopped,
        }
    }

    /// Rate-limit gate. Returns false (and notifies) when the job must
    /// not be queued.
    fn admit(&self, record: &Record) -> bool {
        let limiter = self.limiter.read().clone();
        match limiter {
            Some(limiter) if !limiter.try_acquire(1) => {
                let total = self.counters.rate_limited.fetch_add(1, Ordering::Relaxed) + 1;
                let callback = self.on_limit.read().clone();
                if let Some(callback) = callback {
                    callback(record, Dropped { count: 1, total });
                }
                false
            }
            _ => true,
        }
    }

    /// Account `count` lost records and notify once with `record`.
    fn drop_records(&self, record: &Record, count: u64) {
        let total = self.counters.dropped.fetch_add(count, Ordering::Relaxed) + count;
        let callback = self.on_drop.read().clone();
        if let Some(callback) = callback {
            callback(record, Dropped { count, total });
        }
    }

    /// Close the queue and drop everything still in it, notifying once
    /// with the first lost record. Whoever gets here first reports the
    /// backlog; a later call finds the queue empty.
    fn drop_backlog(&self) {
        let mut lost = 0u64;
        let mut first: Option<Arc<Record>> = None;
        {
            let mut queue = self.queue.lock();
            queue.close();
            while let Ok(job) = queue.try_recv() {
                lost += 1;
                match first {
                    None => first = Some(job.record),
                    Some(_) => self.pool.release_shared(job.record),
                }
            }
        }

        if let Some(record) = first {
            diag::always(
                &self.name,
                format_args!("closed with {lost} records not yet written, dropping them"),
            );
            self.drop_records(&record, lost);
            self.pool.release_shared(record);
        }
    }

    fn next_queued(&self) -> Option<Job> {
        self.queue.lock().try_recv().ok()
    }

    fn past_deadline(&self) -> bool {
        if self.state.load(Ordering::Acquire) == RUNNING {
            return false;
        }
        self.deadline
            .lock()
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

struct Control {
    quit: Option<oneshot::Sender<()>>,
    done: Option<std_mpsc::Receiver<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

struct EngineInner {
    shared: Arc<Shared>,
    sender: mpsc::Sender<Job>,
    control: Mutex<Control>,
}

/// Handle to a write engine. Cloning is cheap; all clones drive the same
/// queue and worker.
#[derive(Clone)]
pub struct WriteEngine {
    inner: Arc<EngineInner>,
}

/// Configures and starts a [`WriteEngine`].
pub struct EngineBuilder {
    name: String,
    capacity: usize,
    max_wait: Duration,
    limiter: Option<RateLimiter>,
    pool: Option<Arc<RecordPool>>,
    on_drop: Option<DropCallback>,
    on_limit: Option<DropCallback>,
}

impl EngineBuilder {
    /// Maximum number of queued jobs. Must be greater than zero.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Pool that formatted records are returned to.
    pub fn pool(mut self, pool: Arc<RecordPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn on_drop<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Record, Dropped) + Send + Sync + 'static,
    {
        self.on_drop = Some(Arc::new(callback));
        self
    }

    pub fn on_limit<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Record, Dropped) + Send + Sync + 'static,
    {
        self.on_limit = Some(Arc::new(callback));
        self
    }

    /// Start the worker thread.
    pub fn spawn(self) -> Result<WriteEngine, LogError> {
        if self.capacity == 0 {
            return Err(LogError::InvalidQueueCapacity);
        }

        let start_error = |source| LogError::EngineStart {
            name: self.name.clone(),
            source,
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(start_error)?;

        let (sender, receiver) = mpsc::channel(self.capacity);
        let shared = Arc::new(Shared {
            name: self.name.clone(),
            state: AtomicU8::new(RUNNING),
            counters: Counters::default(),
            on_drop: RwLock::new(self.on_drop.clone()),
            on_limit: RwLock::new(self.on_limit.clone()),
            limiter: RwLock::new(self.limiter.map(Arc::new)),
            pool: self.pool.clone().unwrap_or_default(),
            sampler: ErrorSampler::new(),
            max_wait: self.max_wait,
            deadline: Mutex::new(None),
            queue: Mutex::new(receiver),
        });

        let (quit_tx, quit_rx) = oneshot::channel();
        let (done_tx, done_rx) = std_mpsc::channel();

        let worker = Worker {
            shared: Arc::clone(&shared),
            buffer: Vec::with_capacity(WRITE_BUFFER_CAPACITY),
            pending: 0,
        };
        let handle = thread::Builder::new()
            .name(format!("log-engine-{}", self.name))
            .spawn(move || {
                runtime.block_on(worker.run(quit_rx));
                let _ = done_tx.send(());
            })
            .map_err(start_error)?;

        tracing::debug!(engine = %self.name, capacity = self.capacity, "write engine started");

        Ok(WriteEngine {
            inner: Arc::new(EngineInner {
                shared,
                sender,
                control: Mutex::new(Control {
                    quit: Some(quit_tx),
                    done: Some(done_rx),
                    worker: Some(handle),
                }),
            }),
        })
    }
}

impl WriteEngine {
    pub fn builder(name: impl Into<String>) -> EngineBuilder {
        EngineBuilder {
            name: name.into(),
            capacity: DEFAULT_QUEUE_CAPACITY,
            max_wait: MAX_WAIT_ON_CLOSE,
            limiter: None,
            pool: None,
            on_drop: None,
            on_limit: None,
        }
    }

    /// Engine with default settings and the given queue capacity.
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self, LogError> {
        Self::builder(name).capacity(capacity).spawn()
    }

    pub fn name(&self) -> &str {
        &self.inner.shared.name
    }

    pub fn state(&self) -> EngineState {
        self.inner.shared.state()
    }

    pub fn pool(&self) -> &Arc<RecordPool> {
        &self.inner.shared.pool
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.sender.max_capacity()
    }

    /// Jobs currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.inner.sender.max_capacity() - self.inner.sender.capacity()
    }

    /// Called whenever a record is dropped instead of queued.
    pub fn set_drop_callback<F>(&self, callback: F)
    where
        F: Fn(&Record, Dropped) + Send + Sync + 'static,
    {
        *self.inner.shared.on_drop.write() = Some(Arc::new(callback));
    }

    /// Called whenever the rate limiter rejects a record.
    pub fn set_limit_callback<F>(&self, callback: F)
    where
        F: Fn(&Record, Dropped) + Send + Sync + 'static,
    {
        *self.inner.shared.on_limit.write() = Some(Arc::new(callback));
    }

    /// Install, replace or (with `None`) remove the rate limiter.
    pub fn set_limiter(&self, limiter: Option<RateLimiter>) {
        *self.inner.shared.limiter.write() = limiter.map(Arc::new);
    }

    /// Queue `record` for `handler`, formatted with `formatter`.
    ///
    /// Never blocks. The record is dropped (counted, drop callback
    /// invoked, record returned to the pool) when the queue is full or
    /// the engine is closing; it is skipped (counted, rate-limit callback
    /// invoked) when the limiter has no token. Accepted records are
    /// returned to the pool by the worker once formatted.
    pub fn enqueue(&self, handler: &Handler, formatter: Arc<dyn Formatter>, record: Arc<Record>) {
        let shared = &self.inner.shared;
        shared.counters.submitted.fetch_add(1, Ordering::Relaxed);

        if shared.state.load(Ordering::Acquire) != RUNNING {
            shared.drop_records(&record, 1);
            shared.pool.release_shared(record);
            return;
        }

        if !shared.admit(&record) {
            shared.pool.release_shared(record);
            return;
        }

        let job = Job {
            target: handler.target(),
            formatter,
            record,
        };
        match self.inner.sender.try_send(job) {
            Ok(()) => {
                shared.counters.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(job) | TrySendError::Closed(job)) => {
                shared.drop_records(&job.record, 1);
                shared.pool.release_shared(job.record);
            }
        }
    }

    pub fn stats(&self) -> EngineStats {
        let shared = &self.inner.shared;
        let counters = &shared.counters;
        EngineStats {
            name: shared.name.clone(),
            state: shared.state(),
            submitted: counters.submitted.load(Ordering::Relaxed),
            accepted: counters.accepted.load(Ordering::Relaxed),
            written: counters.written.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            rate_limited: counters.rate_limited.load(Ordering::Relaxed),
            format_errors: counters.format_errors.load(Ordering::Relaxed),
            write_errors: counters.write_errors.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs, let the worker flush the queue, and wait for
    /// it to exit.
    ///
    /// Blocks the caller for at most the configured max wait. Jobs still
    /// queued when the wait runs out are dropped, counted and reported to
    /// the drop callback once before `close` returns, even if a sink write
    /// is still blocked. Calling `close` again is a no-op.
    pub fn close(&self) {
        let shared = &self.inner.shared;
        if shared
            .state
            .compare_exchange(RUNNING, DRAINING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let deadline = Instant::now() + shared.max_wait;
        *shared.deadline.lock() = Some(deadline);

        let (quit, done, worker) = {
            let mut control = self.inner.control.lock();
            (control.quit.take(), control.done.take(), control.worker.take())
        };
        if let Some(quit) = quit {
            let _ = quit.send(());
        }

        let finished = match done {
            Some(done) => !matches!(
                done.recv_timeout(deadline.saturating_duration_since(Instant::now())),
                Err(std_mpsc::RecvTimeoutError::Timeout)
            ),
            None => true,
        };

        if finished {
            if let Some(worker) = worker {
                if worker.join().is_err() {
                    diag::always(&shared.name, format_args!("write worker panicked"));
                }
            }
        } else {
            // The worker is stuck inside a sink; leave it detached and
            // account its backlog here.
            diag::always(
                &shared.name,
                format_args!("close gave up after {:?}, a sink write is still blocked", shared.max_wait),
            );
            shared.drop_backlog();
        }
        shared.state.store(STOPPED, Ordering::Release);
        tracing::debug!(engine = %shared.name, "write engine closed");
    }
}

impl fmt::Debug for WriteEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteEngine")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

struct Worker {
    shared: Arc<Shared>,
    buffer: Vec<u8>,
    /// Records formatted into `buffer` since the last flush.
    pending: u64,
}

impl Worker {
    async fn run(mut self, mut quit: oneshot::Receiver<()>) {
        let shared = Arc::clone(&self.shared);
        loop {
            tokio::select! {
                biased;
                // Also fires when every engine handle is gone.
                _ = &mut quit => break,
                job = future::poll_fn(|cx| shared.queue.lock().poll_recv(cx)) => match job {
                    Some(job) => self.write_batch(job),
                    None => break,
                },
            }
        }
        self.drain();
    }

    /// Format `job`, then keep pulling queued jobs while there are any,
    /// flushing whenever the buffer fills or the destination changes.
    fn write_batch(&mut self, job: Job) {
        let Job {
            mut target,
            formatter,
            record,
        } = job;
        self.format(&formatter, record);

        loop {
            if self.buffer.len() >= FLUSH_THRESHOLD {
                self.flush(&target);
            }
            if self.shared.past_deadline() {
                break;
            }
            let next = match self.shared.next_queued() {
                Some(next) => next,
                None => break,
            };
            if !next.target.same_sink(&target) && !self.buffer.is_empty() {
                self.flush(&target);
            }
            target = next.target;
            self.format(&next.formatter, next.record);
        }

        if !self.buffer.is_empty() {
            self.flush(&target);
        }
    }

    fn format(&mut self, formatter: &Arc<dyn Formatter>, record: Arc<Record>) {
        let start = self.buffer.len();
        let buffer = &mut self.buffer;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| formatter.format(buffer, &record)));

        let formatted = match outcome {
            Ok(Ok(())) => true,
            failed => {
                self.buffer.truncate(start);
                self.shared.counters.format_errors.fetch_add(1, Ordering::Relaxed);
                match failed {
                    Ok(Err(err)) => diag::report(
                        &self.shared.sampler,
                        &self.shared.name,
                        format_args!("{} formatter failed: {err}", formatter.name()),
                    ),
                    _ => diag::report(
                        &self.shared.sampler,
                        &self.shared.name,
                        format_args!("{} formatter panicked", formatter.name()),
                    ),
                }
                self.fallback(start, &record)
            }
        };

        if formatted {
            self.pending += 1;
        } else {
            self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.pool.release_shared(record);
    }

    fn fallback(&mut self, start: usize, record: &Record) -> bool {
        match TextLineFormatter.format(&mut self.buffer, record) {
            Ok(()) => true,
            Err(_) => {
                self.buffer.truncate(start);
                false
            }
        }
    }

    fn flush(&mut self, target: &Target) {
        let buffer = &self.buffer;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut sink = target.sink.lock();
            sink.write(buffer).and_then(|_| sink.flush())
        }));

        match outcome {
            Ok(Ok(())) => {
                self.shared.counters.written.fetch_add(self.pending, Ordering::Relaxed);
            }
            Ok(Err(err)) => {
                self.shared.counters.write_errors.fetch_add(1, Ordering::Relaxed);
                diag::report(
                    &self.shared.sampler,
                    &self.shared.name,
                    format_args!("write of {} bytes to {} failed: {err}", self.buffer.len(), target.name),
                );
            }
            Err(_) => {
                self.shared.counters.write_errors.fetch_add(1, Ordering::Relaxed);
                diag::report(
                    &self.shared.sampler,
                    &self.shared.name,
                    format_args!("sink {} panicked during write", target.name),
                );
            }
        }

        self.buffer.clear();
        self.pending = 0;
        if self.buffer.capacity() > 8 * WRITE_BUFFER_CAPACITY {
            self.buffer.shrink_to(WRITE_BUFFER_CAPACITY);
        }
    }

    /// Write what is still queued until the close deadline, then drop the
    /// rest.
    fn drain(&mut self) {
        let deadline = self
            .shared
            .deadline
            .lock()
            .unwrap_or_else(|| Instant::now() + self.shared.max_wait);

        while Instant::now() < deadline {
            match self.shared.next_queued() {
                Some(job) => self.write_batch(job),
                None => break,
            }
        }
        self.shared.drop_backlog();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;
    use crate::level::Level;
    use crate::noop_sink::NoopSink;
    use crate::sink::Sink;
    use std::io;
    use std::sync::atomic::AtomicUsize;

    /// Records every write call separately.
    #[derive(Clone, Default)]
    struct Calls(Arc<Mutex<Vec<Vec<u8>>>>);

    impl Sink for Calls {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().push(buf.to_vec());
            Ok(buf.len())
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn try_clone(&self) -> Result<Box<dyn Sink>, LogError> {
            Ok(Box::new(self.clone()))
        }

        fn describe(&self) -> String {
            "calls".to_string()
        }
    }

    struct Failing;

    impl Sink for Failing {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn try_clone(&self) -> Result<Box<dyn Sink>, LogError> {
            Ok(Box::new(Failing))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    struct Broken;

    impl Formatter for Broken {
        fn format(&self, _buf: &mut Vec<u8>, _record: &Record) -> Result<(), FormatError> {
            Err(FormatError::Custom("cannot encode".to_string()))
        }
    }

    fn record(message: &str) -> Arc<Record> {
        Arc::new(Record::new(Level::Info, message))
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            WriteEngine::new("zero", 0),
            Err(LogError::InvalidQueueCapacity)
        ));
    }

    #[test]
    fn writes_reach_the_sink_and_are_counted() {
        let engine = WriteEngine::new("basic", 16).unwrap();
        let calls = Calls::default();
        let handler = Handler::new("calls", calls.clone(), &engine);

        for i in 0..3 {
            handler.async_write(record(&format!("line {i}")));
        }
        engine.close();

        let written: Vec<u8> = calls.0.lock().concat();
        assert_eq!(written, b"line 0\nline 1\nline 2\n");
        let stats = engine.stats();
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.written, 3);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.state, EngineState::Stopped);
    }

    #[test]
    fn formatter_failure_falls_back_to_text() {
        let engine = WriteEngine::new("fallback", 16).unwrap();
        let calls = Calls::default();
        let handler = Handler::new("calls", calls.clone(), &engine).with_formatter(Arc::new(Broken));

        handler.async_write(record("still written"));
        engine.close();

        assert_eq!(calls.0.lock().concat(), b"still written\n");
        let stats = engine.stats();
        assert_eq!(stats.format_errors, 1);
        assert_eq!(stats.written, 1);
    }

    #[test]
    fn write_errors_do_not_stop_the_worker() {
        let engine = WriteEngine::new("errors", 16).unwrap();
        let failing = Handler::new("failing", Failing, &engine);
        let calls = Calls::default();
        let healthy = Handler::new("calls", calls.clone(), &engine);

        failing.async_write(record("lost"));
        healthy.async_write(record("kept"));
        engine.close();

        assert_eq!(calls.0.lock().concat(), b"kept\n");
        let stats = engine.stats();
        assert_eq!(stats.write_errors, 1);
        assert_eq!(stats.written, 1);
    }

    #[test]
    fn closed_engine_drops_and_notifies() {
        let drops = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&drops);
        let engine = WriteEngine::builder("closed")
            .on_drop(move |_, notice| {
                seen.fetch_add(notice.count as usize, Ordering::SeqCst);
            })
            .spawn()
            .unwrap();
        let handler = Handler::new("noop", NoopSink, &engine);

        engine.close();
        handler.async_write(record("too late"));

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(engine.stats().dropped, 1);
        assert_eq!(engine.stats().accepted, 0);
    }

    #[test]
    fn accepted_records_return_to_the_pool() {
        let pool = Arc::new(RecordPool::new());
        let engine = WriteEngine::builder("pool").pool(Arc::clone(&pool)).spawn().unwrap();
        let handler = Handler::new("noop", NoopSink, &engine);

        handler.async_write(record("recycled"));
        engine.close();

        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn buffer_is_flushed_when_destination_changes() {
        let engine = WriteEngine::new("switch", 64).unwrap();
        let a = Calls::default();
        let b = Calls::default();
        let first = Handler::new("a", a.clone(), &engine);
        let second = Handler::new("b", b.clone(), &engine);

        for i in 0..10 {
            first.async_write(record(&format!("a{i}")));
            second.async_write(record(&format!("b{i}")));
        }
        engine.close();

        for (calls, prefix) in [(&a, b'a'), (&b, b'b')] {
            let bytes = calls.0.lock().concat();
            assert!(bytes.split(|&c| c == b'\n').filter(|l| !l.is_empty()).all(|l| l[0] == prefix));
        }
    }

    #[test]
    fn large_batches_flush_in_bounded_chunks() {
        let engine = WriteEngine::new("chunks", 1024).unwrap();
        let calls = Calls::default();
        let handler = Handler::new("calls", calls.clone(), &engine);

        let line = "x".repeat(511);
        for _ in 0..64 {
            handler.async_write(record(&line));
        }
        engine.close();

        let calls = calls.0.lock();
        assert_eq!(calls.iter().map(Vec::len).sum::<usize>(), 64 * 512);
        assert!(calls.iter().all(|chunk| chunk.len() < FLUSH_THRESHOLD + 512));
    }
}
