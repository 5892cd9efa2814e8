use std::io::Read;
use std::net::TcpListener;
use std::thread;

use log_pipeline::{info, warn, HandlerConfig, HandlerKind, LoggerConfig, Pipeline, PipelineConfig};

/// Ships records to a collector over TCP. The "collector" here is a
/// thread in the same process that decodes the `u32 BE length || payload`
/// frames and prints them.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let dsn = format!("tcp://{}?timeout=250&chan=1024", listener.local_addr()?);

    let collector = thread::spawn(move || -> std::io::Result<()> {
        let (mut peer, _) = listener.accept()?;
        let mut header = [0u8; 4];
        while peer.read_exact(&mut header).is_ok() {
            let mut payload = vec![0u8; u32::from_be_bytes(header) as usize];
            peer.read_exact(&mut payload)?;
            print!("[collector] {}", String::from_utf8_lossy(&payload));
        }
        Ok(())
    });

    let pipeline = Pipeline::new(PipelineConfig {
        root: LoggerConfig {
            handlers: vec![
                HandlerConfig::new(HandlerKind::Stderr),
                HandlerConfig::new(HandlerKind::Net { dsn }),
            ],
            ..LoggerConfig::default()
        },
        ..PipelineConfig::default()
    })?;

    let root = pipeline.root();
    info!(root, "collector example started");
    warn!(root, "disk usage at {}%", 91);

    pipeline.shutdown();
    let _ = collector.join();

    for stats in pipeline.stats() {
        println!("{}", serde_json::to_string(&stats)?);
    }
    Ok(())
}
