use crate::error::{DsnError, LogError};
use crate::sink::Sink;
use serde::Deserialize;
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::time::Duration;

/// Length of the big-endian payload-size header in front of every frame.
pub const FRAME_HEADER_LEN: usize = 4;

/// DSN used when a network handler is created without configuration.
pub const DEFAULT_DSN: &str = "unix:///tmp/collector_tcp.sock?timeout=100&chan=1024";

const DEFAULT_QUEUE_DEPTH: usize = 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Socket family used by a [`NetHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Unix,
    Unixgram,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Unix => "unix",
            Transport::Unixgram => "unixgram",
        }
    }
}

/// Connection settings for a [`NetHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetConfig {
    pub transport: Transport,
    /// `host:port` for TCP, a socket path for the unix transports.
    pub address: String,
    /// Capacity of the dedicated write engine queue for this handler.
    pub queue_depth: usize,
    /// Dial and write timeout. Zero disables it.
    pub timeout: Duration,
}

impl NetConfig {
    /// Parse a connection string of the form
    /// `proto://address?timeout=<millis>&chan=<queue depth>`.
    ///
    /// Examples:
    /// - "unix:///tmp/collector.sock?timeout=100&chan=1024"
    /// - "unixgram:///var/run/collector.sock"
    /// - "tcp://127.0.0.1:9000?timeout=250"
    pub fn parse(dsn: &str) -> Result<Self, DsnError> {
        let (scheme, rest) = dsn
            .split_once("://")
            .ok_or_else(|| DsnError::UnknownScheme(dsn.to_string()))?;

        let transport = match scheme.to_ascii_lowercase().as_str() {
            "tcp" => Transport::Tcp,
            "unix" => Transport::Unix,
            "unixgram" => Transport::Unixgram,
            _ => return Err(DsnError::UnknownScheme(dsn.to_string())),
        };

        let (address, query) = rest.split_once('?').unwrap_or((rest, ""));
        let address = decode(address)?;
        if address.is_empty() {
            return Err(DsnError::MissingAddress(dsn.to_string()));
        }

        let mut config = NetConfig {
            transport,
            address,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            timeout: DEFAULT_TIMEOUT,
        };

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = decode(value)?;
            let invalid = || DsnError::InvalidQuery {
                key: key.to_string(),
                value: value.clone(),
            };
            match key {
                "timeout" => {
                    let millis: u64 = value.parse().map_err(|_| invalid())?;
                    config.timeout = Duration::from_millis(millis);
                }
                "chan" => {
                    config.queue_depth = value.parse().map_err(|_| invalid())?;
                    if config.queue_depth == 0 {
                        return Err(invalid());
                    }
                }
                // Unknown keys are tolerated so collectors can add options.
                _ => {}
            }
        }

        Ok(config)
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            transport: Transport::Unix,
            address: "/tmp/collector_tcp.sock".to_string(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::str::FromStr for NetConfig {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(NetConfig::parse(s)?)
    }
}

fn decode(raw: &str) -> Result<String, DsnError> {
    urlencoding::decode(raw)
        .map(|value| value.into_owned())
        .map_err(|_| DsnError::InvalidQuery {
            key: "<encoding>".to_string(),
            value: raw.to_string(),
        })
}

enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(unix)]
    Datagram(UnixDatagram),
}

impl Connection {
    fn dial(config: &NetConfig) -> io::Result<Connection> {
        let timeout = (!config.timeout.is_zero()).then_some(config.timeout);
        match config.transport {
            Transport::Tcp => {
                let addr = config
                    .address
                    .to_socket_addrs()?
                    .next()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address did not resolve"))?;
                let stream = match timeout {
                    Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
                    None => TcpStream::connect(addr)?,
                };
                stream.set_write_timeout(timeout)?;
                stream.set_nodelay(true)?;
                Ok(Connection::Tcp(stream))
            }
            #[cfg(unix)]
            Transport::Unix => {
                let stream = UnixStream::connect(&config.address)?;
                stream.set_write_timeout(timeout)?;
                Ok(Connection::Unix(stream))
            }
            #[cfg(unix)]
            Transport::Unixgram => {
                let socket = UnixDatagram::unbound()?;
                socket.connect(&config.address)?;
                socket.set_write_timeout(timeout)?;
                Ok(Connection::Datagram(socket))
            }
            #[cfg(not(unix))]
            Transport::Unix | Transport::Unixgram => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not available on this platform",
            )),
        }
    }

    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        match self {
            Connection::Tcp(stream) => stream.write_all(frame),
            #[cfg(unix)]
            Connection::Unix(stream) => stream.write_all(frame),
            #[cfg(unix)]
            Connection::Datagram(socket) => socket.send(frame).map(|_| ()),
        }
    }

    fn shutdown(self) {
        match self {
            Connection::Tcp(stream) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
            #[cfg(unix)]
            Connection::Unix(stream) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
            #[cfg(unix)]
            Connection::Datagram(_) => {}
        }
    }
}

/// Sends each flushed batch as one frame, `u32 big-endian length ||
/// payload`, over a lazily dialed socket.
///
/// A failed write tears the connection down and returns the error; the
/// next write dials again. Nothing is retried in place.
pub struct NetHandler {
    config: NetConfig,
    conn: Option<Connection>,
    frame: Vec<u8>,
}

impl NetHandler {
    pub fn new(config: NetConfig) -> Self {
        NetHandler {
            config,
            conn: None,
            frame: Vec::new(),
        }
    }

    pub fn from_dsn(dsn: &str) -> Result<Self, LogError> {
        Ok(NetHandler::new(NetConfig::parse(dsn)?))
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn connection(&mut self) -> io::Result<&mut Connection> {
        if self.conn.is_none() {
            let conn = Connection::dial(&self.config).map_err(|err| {
                io::Error::new(
                    err.kind(),
                    format!("connect {}://{} failed: {err}", self.config.transport.as_str(), self.config.address),
                )
            })?;
            tracing::debug!(
                transport = self.config.transport.as_str(),
                address = %self.config.address,
                "log collector connected"
            );
            self.conn = Some(conn);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no connection"))
    }
}

/// Encode `payload` as one wire frame into `frame`, replacing its contents.
pub fn encode_frame(frame: &mut Vec<u8>, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload larger than u32::MAX"))?;
    frame.clear();
    frame.reserve(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(())
}

impl Sink for NetHandler {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty payload"));
        }

        let mut frame = std::mem::take(&mut self.frame);
        let result = match encode_frame(&mut frame, buf) {
            Ok(()) => match self.connection() {
                Ok(conn) => conn.send(&frame),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        self.frame = frame;

        match result {
            Ok(()) => Ok(self.frame.len()),
            Err(err) => {
                if let Some(conn) = self.conn.take() {
                    conn.shutdown();
                }
                Err(err)
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.shutdown();
        }
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Sink>, LogError> {
        Ok(Box::new(NetHandler::new(self.config.clone())))
    }

    fn describe(&self) -> String {
        format!("{}://{}", self.config.transport.as_str(), self.config.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn parses_unix_dsn_with_query() {
        let config = NetConfig::parse("unix:///tmp/collector.sock?timeout=250&chan=64").unwrap();
        assert_eq!(config.transport, Transport::Unix);
        assert_eq!(config.address, "/tmp/collector.sock");
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.queue_depth, 64);
    }

    #[test]
    fn parses_tcp_dsn_with_defaults() {
        let config: NetConfig = "TCP://127.0.0.1:9000".parse().unwrap();
        assert_eq!(config.transport, Transport::Tcp);
        assert_eq!(config.address, "127.0.0.1:9000");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.queue_depth, DEFAULT_QUEUE_DEPTH);
    }

    #[test]
    fn default_dsn_matches_default_config() {
        assert_eq!(NetConfig::parse(DEFAULT_DSN).unwrap(), NetConfig::default());
    }

    #[test]
    fn rejects_malformed_dsns() {
        assert!(matches!(
            NetConfig::parse("http://example.com"),
            Err(DsnError::UnknownScheme(_))
        ));
        assert!(matches!(NetConfig::parse("no-scheme"), Err(DsnError::UnknownScheme(_))));
        assert!(matches!(NetConfig::parse("tcp://?timeout=1"), Err(DsnError::MissingAddress(_))));
        assert!(matches!(
            NetConfig::parse("tcp://127.0.0.1:1?timeout=soon"),
            Err(DsnError::InvalidQuery { key, .. }) if key == "timeout"
        ));
        assert!(matches!(
            NetConfig::parse("tcp://127.0.0.1:1?chan=0"),
            Err(DsnError::InvalidQuery { key, .. }) if key == "chan"
        ));
    }

    #[test]
    fn frame_is_length_prefixed_big_endian() {
        let mut frame = vec![9, 9, 9];
        encode_frame(&mut frame, b"hello").unwrap();
        assert_eq!(frame, [0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn empty_payload_is_an_error() {
        let mut handler = NetHandler::new(NetConfig::default());
        assert!(handler.write(b"").is_err());
        assert!(!handler.is_connected());
    }

    #[test]
    fn dials_lazily_and_frames_each_write() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut handler = NetHandler::from_dsn(&format!("tcp://{addr}?timeout=1000")).unwrap();
        assert!(!handler.is_connected());

        assert_eq!(handler.write(b"abc\n").unwrap(), 8);
        assert_eq!(handler.write(b"de\n").unwrap(), 7);
        assert!(handler.is_connected());
        handler.close().unwrap();

        let (mut peer, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        peer.read_to_end(&mut received).unwrap();
        assert_eq!(received, b"\0\0\0\x04abc\n\0\0\0\x03de\n");
    }

    #[test]
    fn failed_dial_surfaces_error_and_stays_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut handler = NetHandler::from_dsn(&format!("tcp://{addr}?timeout=200")).unwrap();
        assert!(handler.write(b"lost\n").is_err());
        assert!(!handler.is_connected());
    }

    #[test]
    fn broken_connection_is_torn_down_and_redialed_on_next_write() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut handler = NetHandler::from_dsn(&format!("tcp://{addr}?timeout=1000")).unwrap();

        handler.write(b"first\n").unwrap();
        let (peer, _) = listener.accept().unwrap();
        // Unread data makes the close a reset.
        drop(peer);

        // Writes right after the reset may still land in the local buffer.
        let mut failures = 0;
        for _ in 0..100 {
            if handler.write(b"lost\n").is_err() {
                failures += 1;
                break;
            }
            assert!(handler.is_connected());
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(failures, 1);
        assert!(!handler.is_connected());

        assert_eq!(handler.write(b"c").unwrap(), 5);
        assert!(handler.is_connected());
        let (mut peer, _) = listener.accept().unwrap();
        handler.close().unwrap();

        let mut received = Vec::new();
        peer.read_to_end(&mut received).unwrap();
        assert_eq!(received, [0, 0, 0, 1, b'c']);
    }
}
