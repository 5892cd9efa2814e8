//! Asynchronous multi-destination logging.
//!
//! Call sites hand records to a [`Logger`]; the logger enqueues one job
//! per [`Handler`] on a [`WriteEngine`] and returns. A single worker
//! thread per engine formats, batches and writes to streams, files,
//! rotating files and framed sockets. The queue is bounded: when it is
//! full records are dropped and counted, never waited for.
//!
//! ```no_run
//! use log_pipeline::{info, Handler, Logger, WriteEngine};
//!
//! let engine = WriteEngine::new("app", 4096)?;
//! let logger = Logger::builder("app")
//!     .handler(Handler::size_rotating("/var/log/app.log", 100 << 20, 5, &engine)?)
//!     .build()?;
//! info!(logger, "listening on {}", 8080);
//! engine.close();
//! # Ok::<(), log_pipeline::LogError>(())
//! ```

pub mod config;
mod diag;
pub mod engine;
pub mod env;
pub mod error;
pub mod file;
pub mod formatter;
pub mod handler;
pub mod level;
pub mod limiter;
pub mod logger;
pub mod net;
pub mod noop_sink;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod stream;

#[cfg(feature = "tracing-layer")]
pub mod init;
#[cfg(feature = "tracing-layer")]
pub mod layer;

pub use config::{EngineConfig, HandlerConfig, HandlerKind, LoggerConfig, PipelineConfig};
pub use engine::{Dropped, EngineState, EngineStats, WriteEngine};
pub use error::{DsnError, FormatError, LogError};
pub use formatter::{Formatter, JsonFormatter, TextLineFormatter};
pub use handler::Handler;
pub use level::{Flags, Level};
pub use limiter::RateLimiter;
pub use logger::Logger;
pub use pipeline::Pipeline;
pub use record::{Fields, Record, RecordPool};
pub use sink::Sink;
