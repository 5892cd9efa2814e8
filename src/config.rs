//! Declarative configuration for engines, handlers and loggers.
//!
//! Every type here is `serde`-deserializable so a service can keep its
//! logging setup next to the rest of its configuration:
//!
//! ```json
//! {
//!   "engine": { "queue_capacity": 8192, "rate_limit": { "rate": 500.0, "burst": 1000 } },
//!   "root": {
//!     "level": "info",
//!     "handlers": [
//!       { "kind": "stdout" },
//!       { "kind": "size_rotating", "path": "/var/log/app.log", "max_bytes": 104857600, "backup_count": 5 },
//!       { "kind": "net", "dsn": "unix:///tmp/collector.sock?timeout=100&chan=1024", "format": "json" }
//!     ]
//!   }
//! }
//! ```

use crate::engine::{EngineBuilder, WriteEngine, DEFAULT_QUEUE_CAPACITY, MAX_WAIT_ON_CLOSE};
use crate::env::{
    env_parse, LOG_PIPELINE_LEVEL_ENV, LOG_PIPELINE_MAX_MESSAGE_BYTES_ENV, LOG_PIPELINE_NET_DSN_ENV,
    LOG_PIPELINE_QUEUE_CAPACITY_ENV,
};
use crate::error::LogError;
use crate::file::When;
use crate::formatter::{self, Formatter};
use crate::handler::Handler;
use crate::level::Level;
use crate::limiter::RateLimiter;
use crate::logger::Logger;
use crate::net::NetConfig;
use crate::record::{Fields, DEFAULT_MAX_MESSAGE_BYTES};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Settings for one [`WriteEngine`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    pub queue_capacity: usize,
    /// How long `close` waits for the queue to drain, in milliseconds.
    pub max_wait_ms: u64,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            name: "default".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_wait_ms: MAX_WAIT_ON_CLOSE.as_millis() as u64,
            rate_limit: None,
        }
    }
}

impl EngineConfig {
    /// A builder carrying these settings, ready for callbacks or a pool
    /// to be added before `spawn`.
    pub fn builder(&self) -> Result<EngineBuilder, LogError> {
        let mut builder = WriteEngine::builder(self.name.clone())
            .capacity(self.queue_capacity)
            .max_wait(Duration::from_millis(self.max_wait_ms));
        if let Some(limit) = &self.rate_limit {
            builder = builder.limiter(limit.build()?);
        }
        Ok(builder)
    }

    pub fn spawn(&self) -> Result<WriteEngine, LogError> {
        self.builder()?.spawn()
    }
}

/// Token bucket settings, see [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RateLimitConfig {
    /// Tokens per second.
    pub rate: f64,
    pub burst: u32,
}

impl RateLimitConfig {
    pub fn build(&self) -> Result<RateLimiter, LogError> {
        RateLimiter::new(self.rate, self.burst)
    }
}

/// Output encoding selected for a handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    #[default]
    Text,
    Json,
}

impl FormatKind {
    pub fn formatter(self) -> Arc<dyn Formatter> {
        match self {
            FormatKind::Text => formatter::text(),
            FormatKind::Json => formatter::json(),
        }
    }
}

/// Destination of a handler, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerKind {
    Stdout,
    Stderr,
    File {
        path: PathBuf,
    },
    SizeRotating {
        path: PathBuf,
        max_bytes: u64,
        backup_count: u32,
    },
    TimeRotating {
        path: PathBuf,
        when: When,
        #[serde(default = "default_multiplier")]
        multiplier: u32,
    },
    Net {
        dsn: String,
    },
}

fn default_multiplier() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HandlerConfig {
    #[serde(flatten)]
    pub kind: HandlerKind,
    #[serde(default)]
    pub format: FormatKind,
}

impl HandlerConfig {
    pub fn new(kind: HandlerKind) -> Self {
        HandlerConfig {
            kind,
            format: FormatKind::Text,
        }
    }

    /// Open the handler and bind it to `engine`.
    ///
    /// Network handlers are bound to `engine` as well; use
    /// [`Pipeline::handler`](crate::pipeline::Pipeline::handler) to give
    /// them a dedicated engine sized by the DSN's `chan`.
    pub fn build(&self, engine: &WriteEngine) -> Result<Handler, LogError> {
        let handler = match &self.kind {
            HandlerKind::Stdout => Handler::stdout(engine),
            HandlerKind::Stderr => Handler::stderr(engine),
            HandlerKind::File { path } => Handler::file(path, engine)?,
            HandlerKind::SizeRotating {
                path,
                max_bytes,
                backup_count,
            } => Handler::size_rotating(path, *max_bytes, *backup_count, engine)?,
            HandlerKind::TimeRotating {
                path,
                when,
                multiplier,
            } => Handler::time_rotating(path, *when, *multiplier, engine)?,
            HandlerKind::Net { dsn } => Handler::net(dsn.parse::<NetConfig>()?, engine),
        };
        Ok(handler.with_formatter(self.format.formatter()))
    }
}

/// Settings for one [`Logger`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub name: String,
    pub level: Level,
    pub max_message_bytes: usize,
    pub handlers: Vec<HandlerConfig>,
    /// Non-empty fields switch every handler to JSON.
    pub fields: Fields,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            name: "root".to_string(),
            level: Level::Info,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            handlers: vec![HandlerConfig::new(HandlerKind::Stdout)],
            fields: Fields::new(),
        }
    }
}

impl LoggerConfig {
    /// Build a logger whose handlers all run on `engine`.
    pub fn build(&self, engine: &WriteEngine) -> Result<Logger, LogError> {
        self.build_with(engine, |config| config.build(engine))
    }

    pub(crate) fn build_with<F>(&self, engine: &WriteEngine, mut open: F) -> Result<Logger, LogError>
    where
        F: FnMut(&HandlerConfig) -> Result<Handler, LogError>,
    {
        let mut builder = Logger::builder(self.name.clone())
            .level(self.level)
            .max_message_bytes(self.max_message_bytes)
            .pool(Arc::clone(engine.pool()))
            .fields(self.fields.clone());
        for config in &self.handlers {
            builder = builder.handler(open(config)?);
        }
        builder.build()
    }
}

/// Everything [`Pipeline::new`](crate::pipeline::Pipeline::new) needs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub engine: EngineConfig,
    pub root: LoggerConfig,
}

impl PipelineConfig {
    /// Defaults overridden by the `LOG_PIPELINE_*` variables in
    /// [`env`](crate::env).
    pub fn from_env() -> Result<Self, LogError> {
        let mut config = PipelineConfig::default();

        if let Some(level) = env_parse::<String>(LOG_PIPELINE_LEVEL_ENV)? {
            config.root.level = level.parse()?;
        }
        if let Some(capacity) = env_parse::<usize>(LOG_PIPELINE_QUEUE_CAPACITY_ENV)? {
            if capacity == 0 {
                return Err(LogError::InvalidQueueCapacity);
            }
            config.engine.queue_capacity = capacity;
        }
        if let Some(max) = env_parse::<usize>(LOG_PIPELINE_MAX_MESSAGE_BYTES_ENV)? {
            config.root.max_message_bytes = max;
        }
        if let Some(dsn) = env_parse::<String>(LOG_PIPELINE_NET_DSN_ENV)? {
            NetConfig::parse(&dsn)?;
            config.root.handlers.push(HandlerConfig {
                kind: HandlerKind::Net { dsn },
                format: FormatKind::Json,
            });
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn deserializes_full_config() {
        let raw = r#"{
            "engine": { "name": "svc", "queue_capacity": 64, "rate_limit": { "rate": 10.5, "burst": 20 } },
            "root": {
                "level": "warn",
                "handlers": [
                    { "kind": "stderr" },
                    { "kind": "size_rotating", "path": "/tmp/a.log", "max_bytes": 100, "backup_count": 2, "format": "json" },
                    { "kind": "time_rotating", "path": "/tmp/b.log", "when": "hour" },
                    { "kind": "net", "dsn": "tcp://127.0.0.1:9000?timeout=250" }
                ],
                "fields": { "service": "billing" }
            }
        }"#;
        let config: PipelineConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(config.engine.name, "svc");
        assert_eq!(config.engine.queue_capacity, 64);
        assert_eq!(config.engine.max_wait_ms, 10_000);
        assert_eq!(
            config.engine.rate_limit,
            Some(RateLimitConfig { rate: 10.5, burst: 20 })
        );
        assert_eq!(config.root.level, Level::Warn);
        assert_eq!(config.root.max_message_bytes, DEFAULT_MAX_MESSAGE_BYTES);
        assert_eq!(config.root.handlers.len(), 4);
        assert_eq!(config.root.handlers[1].format, FormatKind::Json);
        assert_eq!(
            config.root.handlers[2].kind,
            HandlerKind::TimeRotating {
                path: PathBuf::from("/tmp/b.log"),
                when: When::Hour,
                multiplier: 1,
            }
        );
        assert_eq!(config.root.fields["service"], "billing");
    }

    #[test]
    fn unknown_handler_kind_is_rejected() {
        let raw = r#"{ "kind": "carrier_pigeon" }"#;
        assert!(serde_json::from_str::<HandlerConfig>(raw).is_err());
    }

    #[test]
    fn builds_logger_on_engine() {
        let dir = TempDir::new().unwrap();
        let engine = EngineConfig {
            name: "config-build".to_string(),
            ..EngineConfig::default()
        }
        .spawn()
        .unwrap();

        let config = LoggerConfig {
            name: "files".to_string(),
            level: Level::Debug,
            handlers: vec![
                HandlerConfig::new(HandlerKind::File {
                    path: dir.path().join("plain.log"),
                }),
                HandlerConfig {
                    kind: HandlerKind::SizeRotating {
                        path: dir.path().join("sized.log"),
                        max_bytes: 1024,
                        backup_count: 1,
                    },
                    format: FormatKind::Json,
                },
            ],
            ..LoggerConfig::default()
        };
        let logger = config.build(&engine).unwrap();

        assert_eq!(logger.name(), "files");
        assert_eq!(logger.level(), Level::Debug);
        assert_eq!(logger.handler_count(), 2);
        crate::debug!(logger, "configured");
        engine.close();

        let plain = std::fs::read_to_string(dir.path().join("plain.log")).unwrap();
        assert!(plain.ends_with(" - configured\n"), "{plain}");
        let sized = std::fs::read_to_string(dir.path().join("sized.log")).unwrap();
        let json: serde_json::Value = serde_json::from_str(sized.trim_end()).unwrap();
        assert_eq!(json["msg"], "configured");
    }

    #[test]
    fn invalid_handler_settings_surface_as_errors() {
        let engine = WriteEngine::new("config-errors", 4).unwrap();
        let bad_dsn = HandlerConfig::new(HandlerKind::Net {
            dsn: "ftp://nowhere".to_string(),
        });
        assert!(matches!(bad_dsn.build(&engine), Err(LogError::Dsn(_))));

        let dir = TempDir::new().unwrap();
        let zero = HandlerConfig::new(HandlerKind::SizeRotating {
            path: dir.path().join("zero.log"),
            max_bytes: 0,
            backup_count: 1,
        });
        assert!(matches!(zero.build(&engine), Err(LogError::InvalidMaxBytes)));

        let limit = EngineConfig {
            rate_limit: Some(RateLimitConfig { rate: 0.0, burst: 1 }),
            ..EngineConfig::default()
        };
        assert!(matches!(limit.spawn(), Err(LogError::InvalidRateLimit { .. })));
        engine.close();
    }
}
