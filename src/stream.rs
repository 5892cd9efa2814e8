use crate::error::LogError;
use crate::sink::Sink;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

/// Writer shared between a stream handler and its clones.
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Where a [`StreamHandler`] writes.
#[derive(Clone)]
pub enum StreamTarget {
    Stdout,
    Stderr,
    /// An already-open writer supplied by the caller.
    Writer(SharedWriter),
}

/// Writes to an already-open stream. Never rotates.
///
/// Streams are process-wide resources, so a clone writes to the same
/// stream as the original.
#[derive(Clone)]
pub struct StreamHandler {
    target: StreamTarget,
}

impl StreamHandler {
    pub fn stdout() -> Self {
        StreamHandler {
            target: StreamTarget::Stdout,
        }
    }

    pub fn stderr() -> Self {
        StreamHandler {
            target: StreamTarget::Stderr,
        }
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        StreamHandler {
            target: StreamTarget::Writer(Arc::new(Mutex::new(Box::new(writer)))),
        }
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }
}

impl Sink for StreamHandler {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.target {
            StreamTarget::Stdout => io::stdout().lock().write_all(buf)?,
            StreamTarget::Stderr => io::stderr().lock().write_all(buf)?,
            StreamTarget::Writer(writer) => writer.lock().write_all(buf)?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.target {
            StreamTarget::Stdout => io::stdout().flush(),
            StreamTarget::Stderr => io::stderr().flush(),
            StreamTarget::Writer(writer) => writer.lock().flush(),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }

    fn try_clone(&self) -> Result<Box<dyn Sink>, LogError> {
        Ok(Box::new(self.clone()))
    }

    fn describe(&self) -> String {
        match &self.target {
            StreamTarget::Stdout => "stdout".to_string(),
            StreamTarget::Stderr => "stderr".to_string(),
            StreamTarget::Writer(_) => "writer".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_target_receives_bytes_and_clones_share_it() {
        let captured = Captured::default();
        let mut handler = StreamHandler::from_writer(captured.clone());
        let mut clone = handler.try_clone().unwrap();

        assert_eq!(handler.write(b"one\n").unwrap(), 4);
        clone.write(b"two\n").unwrap();
        handler.close().unwrap();

        assert_eq!(&*captured.0.lock(), b"one\ntwo\n");
        assert_eq!(clone.describe(), "writer");
    }
}
