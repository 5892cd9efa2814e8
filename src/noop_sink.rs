use crate::error::LogError;
use crate::sink::Sink;
use std::io;

/// A sink that accepts and discards every byte.
///
/// Useful for measuring the overhead of the pipeline itself without any
/// I/O, and for tests that only care about engine counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl Sink for NoopSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Sink>, LogError> {
        Ok(Box::new(NoopSink))
    }

    fn describe(&self) -> String {
        "noop".to_string()
    }
}
