use crate::error::LogError;
use crate::layer::PipelineLayer;
use crate::level::Level;
use crate::logger::Logger;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Settings for the `tracing` bridge.
///
/// **Fields**
/// - `min_level`: events below this level never reach the pipeline.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   installed next to [`PipelineLayer`] and events are also printed to
///   the console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub min_level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            min_level: Level::Info,
            enable_stdout: false,
        }
    }
}

/// Install a global `tracing` subscriber that forwards events into
/// `logger`.
///
/// **Parameters**
/// - `logger`: the [`Logger`] that receives converted events, usually
///   [`Pipeline::root`](crate::pipeline::Pipeline::root).
/// - `config`: [`LayerConfig`] controlling level filtering and console
///   output.
///
/// **Returns**
///
/// `Err(LogError::Subscriber)` if a global subscriber is already set.
pub fn init_tracing_with_config(logger: Arc<Logger>, config: LayerConfig) -> Result<(), LogError> {
    let layer = PipelineLayer::new(logger, config.min_level);

    // The two subscriber shapes have different types, so each branch
    // installs its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`].
pub fn init_tracing(logger: Arc<Logger>) -> Result<(), LogError> {
    init_tracing_with_config(logger, LayerConfig::default())
}
