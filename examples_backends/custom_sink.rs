use std::io;

use log_pipeline::{error, info, Handler, LogError, Logger, Sink, WriteEngine};

/// Example of integrating a completely custom destination by
/// implementing the `Sink` trait directly. Imagine this talks to some
/// proprietary store for which this crate does not provide a built-in
/// handler.
struct MyCustomStoreSink {
    batches: usize,
}

impl Sink for MyCustomStoreSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Here you would call your own client library for the target store.
        // For the sake of example we just print the batch.
        self.batches += 1;
        print!("[my-custom-store #{}] {}", self.batches, String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
        println!("[my-custom-store] closed after {} batches", self.batches);
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Sink>, LogError> {
        Ok(Box::new(MyCustomStoreSink { batches: 0 }))
    }

    fn describe(&self) -> String {
        "my-custom-store".to_string()
    }
}

fn main() -> Result<(), LogError> {
    let engine = WriteEngine::new("custom", 1024)?;
    let logger = Logger::builder("custom")
        .handler(Handler::new("my-custom-store", MyCustomStoreSink { batches: 0 }, &engine))
        .build()?;

    info!(logger, "custom backend example started");
    error!(logger, "simulated error sent via custom backend store={}", "my-custom-store");

    engine.close();
    logger.close()?;
    Ok(())
}
