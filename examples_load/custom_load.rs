use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log_pipeline::noop_sink::NoopSink;
use log_pipeline::{error, Handler, Logger, RateLimiter, WriteEngine};

fn main() -> Result<(), log_pipeline::LogError> {
    let dropped = Arc::new(AtomicU64::new(0));
    let limited = Arc::new(AtomicU64::new(0));
    let dropped_cb = Arc::clone(&dropped);
    let limited_cb = Arc::clone(&limited);

    let engine = WriteEngine::builder("custom-load")
        .capacity(50_000)
        .max_wait(Duration::from_secs(2))
        .limiter(RateLimiter::new(200_000.0, 20_000)?)
        .on_drop(move |_, notice| dropped_cb.store(notice.total, Ordering::Relaxed))
        .on_limit(move |_, notice| limited_cb.store(notice.total, Ordering::Relaxed))
        .spawn()?;

    let logger = Arc::new(
        Logger::builder("load")
            .handler(Handler::new("noop", NoopSink, &engine))
            .build()?,
    );

    let threads: u64 = 4;
    let per_thread: u64 = 25_000;
    let start = Instant::now();

    let producers: Vec<_> = (0..threads)
        .map(|t| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..per_thread {
                    error!(logger, "custom load test error thread={t} iteration={i}");
                }
            })
        })
        .collect();
    for producer in producers {
        let _ = producer.join();
    }

    let elapsed = start.elapsed();
    let n = threads * per_thread;
    println!("custom config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    engine.close();
    println!(
        "written={} dropped={} rate_limited={}",
        engine.stats().written,
        dropped.load(Ordering::Relaxed),
        limited.load(Ordering::Relaxed)
    );
    Ok(())
}
