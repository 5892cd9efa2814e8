//! Routes `tracing` events through the pipeline so libraries that log
//! with `tracing` end up in the same files as the application.

use log_pipeline::init::{init_tracing_with_config, LayerConfig};
use log_pipeline::{HandlerConfig, HandlerKind, Level, LoggerConfig, Pipeline, PipelineConfig};

fn main() -> Result<(), log_pipeline::LogError> {
    let path = std::env::temp_dir().join("log-pipeline-tracing-demo.log");
    let pipeline = Pipeline::new(PipelineConfig {
        root: LoggerConfig {
            level: Level::Debug,
            handlers: vec![
                HandlerConfig::new(HandlerKind::Stdout),
                HandlerConfig::new(HandlerKind::File { path: path.clone() }),
            ],
            ..LoggerConfig::default()
        },
        ..PipelineConfig::default()
    })?;

    init_tracing_with_config(
        pipeline.root(),
        LayerConfig {
            min_level: Level::Debug,
            enable_stdout: false,
        },
    )?;

    tracing::debug!(cache = "warm", "starting");
    tracing::info!(port = 8080, "listening");
    tracing::error!(peer = "10.0.0.7", "connection reset");

    pipeline.shutdown();
    println!("also written to {}", path.display());
    Ok(())
}
