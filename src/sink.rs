use crate::error::LogError;
use std::io;

/// Physical destination behind a [`Handler`](crate::handler::Handler).
///
/// Implementations are responsible for getting bytes onto a concrete
/// medium (a stream, a file, a socket) and for applying their own
/// rotation policy before each write. The write engine only ever calls
/// `write`/`flush` from its single worker thread, so implementations do
/// not need internal locking.
pub trait Sink: Send {
    /// Write one flushed batch of formatted records.
    ///
    /// **Returns**
    /// - `Ok(n)` with the number of bytes accepted.
    /// - `Err(..)` if the destination failed (disk full, broken pipe,
    ///   connection reset, ...). The engine discards the batch and
    ///   reports the error on stderr; the sink must stay usable for the
    ///   next call.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Flush buffered bytes, if the destination buffers.
    ///
    /// Default implementation is a no-op.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Release the descriptor or connection. Writing after `close` is an
    /// error, not a panic.
    fn close(&mut self) -> io::Result<()>;

    /// Duplicate the configuration with a freshly opened descriptor.
    ///
    /// Clones never share a file descriptor or socket with the original.
    fn try_clone(&self) -> Result<Box<dyn Sink>, LogError>;

    /// Human readable destination, e.g. a path or a socket address.
    fn describe(&self) -> String;
}

pub(crate) fn closed_error(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, format!("{what} is closed"))
}
