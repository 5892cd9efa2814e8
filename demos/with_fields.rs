//! Attaching fields switches a logger's output to JSON lines while the
//! parent keeps writing plain text.

use log_pipeline::{info, warn, Fields, Handler, Logger, WriteEngine};

fn main() -> Result<(), log_pipeline::LogError> {
    let engine = WriteEngine::new("fields", 1024)?;
    let logger = Logger::builder("api")
        .handler(Handler::stdout(&engine))
        .build()?;

    info!(logger, "plain text line");

    let request = logger.with_field("request_id", "9f1c")?;
    info!(request, "request accepted");

    let mut extra = Fields::new();
    extra.insert("user".to_string(), "ann".into());
    extra.insert("retries".to_string(), 2.into());
    let detailed = request.with_fields(extra)?;
    warn!(detailed, "upstream slow");

    engine.close();
    Ok(())
}
