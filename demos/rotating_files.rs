//! Writes the same records through a size-rotating and a time-rotating
//! handler, then lists what ended up on disk.

use std::time::Duration;

use log_pipeline::file::When;
use log_pipeline::{info, Handler, Logger, WriteEngine};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("log-pipeline-rotating-demo");
    std::fs::create_dir_all(&dir)?;

    let engine = WriteEngine::new("rotating", 1024)?;
    let logger = Logger::builder("rotating")
        .handler(Handler::size_rotating(dir.join("sized.log"), 4 * 1024, 3, &engine)?)
        .handler(Handler::time_rotating(dir.join("timed.log"), When::Second, 1, &engine)?)
        .build()?;

    for i in 0..200 {
        info!(logger, "request {i} served in {}ms", i % 17);
        if i % 50 == 49 {
            std::thread::sleep(Duration::from_millis(1100));
        }
    }

    engine.close();
    logger.close()?;

    let mut files: Vec<_> = std::fs::read_dir(&dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .collect();
    files.sort();
    for path in files {
        println!("{} ({} bytes)", path.display(), std::fs::metadata(&path)?.len());
    }
    Ok(())
}
