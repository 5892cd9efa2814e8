//! Process-level wiring: one default engine, a root logger and any
//! number of named loggers, torn down together.

use crate::config::{HandlerConfig, HandlerKind, LoggerConfig, PipelineConfig};
use crate::engine::{EngineStats, WriteEngine};
use crate::error::LogError;
use crate::handler::Handler;
use crate::logger::Logger;
use crate::net::NetConfig;
use crate::record::RecordPool;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

const ROOT: &str = "root";

/// Owns the engines and loggers of a process.
///
/// All loggers share the default engine and record pool. Network
/// handlers get their own engine so a slow collector cannot fill the
/// queue that local files depend on.
pub struct Pipeline {
    engine: WriteEngine,
    pool: Arc<RecordPool>,
    root: Arc<Logger>,
    loggers: RwLock<HashMap<String, Arc<Logger>>>,
    /// Dedicated engines, closed after the default one.
    engines: Mutex<Vec<WriteEngine>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Pipeline, LogError> {
        let pool = Arc::new(RecordPool::new());
        let engine = config.engine.builder()?.pool(Arc::clone(&pool)).spawn()?;
        let mut engines = Vec::new();

        let root = config.root.build_with(&engine, |handler| {
            open_handler(handler, &engine, &pool, &mut engines)
        });
        let root = match root {
            Ok(root) => root,
            Err(err) => {
                engine.close();
                engines.iter().for_each(WriteEngine::close);
                return Err(err);
            }
        };

        tracing::info!(engine = %engine.name(), level = %root.level(), "log pipeline started");
        Ok(Pipeline {
            engine,
            pool,
            root: Arc::new(root),
            loggers: RwLock::new(HashMap::new()),
            engines: Mutex::new(engines),
        })
    }

    /// Default engine shared by every logger.
    pub fn engine(&self) -> &WriteEngine {
        &self.engine
    }

    pub fn pool(&self) -> &Arc<RecordPool> {
        &self.pool
    }

    pub fn root(&self) -> Arc<Logger> {
        Arc::clone(&self.root)
    }

    /// Logger registered under `name`.
    ///
    /// `""` and `"root"` return the root logger. An unknown name creates
    /// (and caches) a stdout logger at the root's level.
    pub fn logger(&self, name: &str) -> Arc<Logger> {
        if name.is_empty() || name == ROOT {
            return self.root();
        }
        if let Some(logger) = self.loggers.read().get(name) {
            return Arc::clone(logger);
        }

        let mut loggers = self.loggers.write();
        let logger = loggers.entry(name.to_string()).or_insert_with(|| {
            Arc::new(
                Logger::builder(name)
                    .level(self.root.level())
                    .pool(Arc::clone(&self.pool))
                    .handler(Handler::stdout(&self.engine))
                    .finish(),
            )
        });
        Arc::clone(logger)
    }

    /// Make `logger` available under its name, replacing any previous one.
    pub fn register(&self, logger: Logger) -> Arc<Logger> {
        let logger = Arc::new(logger);
        if let Some(previous) = self
            .loggers
            .write()
            .insert(logger.name().to_string(), Arc::clone(&logger))
        {
            if let Err(err) = previous.close() {
                tracing::warn!(logger = %previous.name(), error = %err, "closing replaced logger failed");
            }
        }
        logger
    }

    /// Build `config` on this pipeline's engines and register it.
    pub fn build_logger(&self, config: &LoggerConfig) -> Result<Arc<Logger>, LogError> {
        let logger = {
            let mut engines = self.engines.lock();
            config.build_with(&self.engine, |handler| {
                open_handler(handler, &self.engine, &self.pool, &mut engines)
            })?
        };
        Ok(self.register(logger))
    }

    /// Open the handler described by `config`. Network handlers get a
    /// dedicated engine.
    pub fn handler(&self, config: &HandlerConfig) -> Result<Handler, LogError> {
        let mut engines = self.engines.lock();
        open_handler(config, &self.engine, &self.pool, &mut engines)
    }

    /// Network handler on its own engine sized by `config.queue_depth`.
    pub fn net_handler(&self, config: NetConfig) -> Result<Handler, LogError> {
        let mut engines = self.engines.lock();
        net_handler(config, &self.pool, &mut engines)
    }

    /// Counters of every engine, default engine first.
    pub fn stats(&self) -> Vec<EngineStats> {
        std::iter::once(self.engine.stats())
            .chain(self.engines.lock().iter().map(WriteEngine::stats))
            .collect()
    }

    /// Drain and stop every engine, then close every handler.
    ///
    /// Bounded by each engine's max wait. Safe to call more than once.
    pub fn shutdown(&self) {
        self.engine.close();
        let engines: Vec<WriteEngine> = self.engines.lock().clone();
        for engine in &engines {
            engine.close();
        }

        let loggers: Vec<Arc<Logger>> = self.loggers.read().values().cloned().collect();
        for logger in std::iter::once(&self.root).chain(loggers.iter()) {
            if let Err(err) = logger.close() {
                tracing::warn!(logger = %logger.name(), error = %err, "closing handlers failed");
            }
        }
        tracing::info!(engine = %self.engine.name(), "log pipeline stopped");
    }
}

fn open_handler(
    config: &HandlerConfig,
    engine: &WriteEngine,
    pool: &Arc<RecordPool>,
    engines: &mut Vec<WriteEngine>,
) -> Result<Handler, LogError> {
    match &config.kind {
        HandlerKind::Net { dsn } => Ok(net_handler(dsn.parse()?, pool, engines)?
            .with_formatter(config.format.formatter())),
        _ => config.build(engine),
    }
}

fn net_handler(
    config: NetConfig,
    pool: &Arc<RecordPool>,
    engines: &mut Vec<WriteEngine>,
) -> Result<Handler, LogError> {
    let name = format!("net-{}", engines.len());
    let engine = WriteEngine::builder(name)
        .capacity(config.queue_depth)
        .pool(Arc::clone(pool))
        .spawn()?;
    let handler = Handler::net(config, &engine);
    engines.push(engine);
    Ok(handler)
}

static GLOBAL: OnceLock<Pipeline> = OnceLock::new();

/// Install `pipeline` as the process default. Fails with the pipeline
/// handed back if a default already exists.
pub fn install(pipeline: Pipeline) -> Result<&'static Pipeline, Pipeline> {
    GLOBAL.set(pipeline)?;
    Ok(global())
}

/// The process default pipeline, created from the environment on first
/// use (see [`PipelineConfig::from_env`]).
///
/// Invalid environment settings fall back to the defaults with a
/// warning. Panics only if the worker thread cannot be spawned.
pub fn global() -> &'static Pipeline {
    GLOBAL.get_or_init(|| {
        let config = PipelineConfig::from_env().unwrap_or_else(|err| {
            eprintln!("[log-pipeline] ignoring environment configuration: {err}");
            PipelineConfig::default()
        });
        Pipeline::new(config)
            .or_else(|_| Pipeline::new(PipelineConfig::default()))
            .expect("start default log pipeline")
    })
}

/// Shut down the process default pipeline if it was ever created.
pub fn shutdown() {
    if let Some(pipeline) = GLOBAL.get() {
        pipeline.shutdown();
    }
}
