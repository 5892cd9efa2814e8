use std::time::Instant;

use log_pipeline::noop_sink::NoopSink;
use log_pipeline::{error, Handler, Logger, WriteEngine};

fn main() -> Result<(), log_pipeline::LogError> {
    let engine = WriteEngine::new("load", log_pipeline::engine::DEFAULT_QUEUE_CAPACITY)?;
    let logger = Logger::builder("load")
        .handler(Handler::new("noop", NoopSink, &engine))
        .build()?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(logger, "default load test error iteration={i}");
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    engine.close();
    let stats = engine.stats();
    println!("written={} dropped={}", stats.written, stats.dropped);
    Ok(())
}
