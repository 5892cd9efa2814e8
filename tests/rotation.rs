use log_pipeline::file::When;
use log_pipeline::{info, Flags, Handler, Logger, WriteEngine};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn wait_for_written(engine: &WriteEngine, written: u64) {
    let start = Instant::now();
    while engine.stats().written < written {
        assert!(start.elapsed() < Duration::from_secs(5), "worker did not write record {written}");
        thread::sleep(Duration::from_millis(5));
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn size_rotation_keeps_backup_count_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    let engine = WriteEngine::new("size-rotation", 64).unwrap();
    let logger = Logger::builder("rotating")
        .flags(Flags::empty())
        .handler(Handler::size_rotating(&path, 100, 2, &engine).unwrap())
        .build()
        .unwrap();

    // 49 bytes + newline: exactly two records fill a file. One record per
    // flush so the rotation check runs before every record.
    for i in 1..=7u64 {
        info!(logger, "record {i} {}", "x".repeat(49 - 9));
        wait_for_written(&engine, i);
    }
    engine.close();
    logger.close().unwrap();

    let line = |i: u32| format!("record {i} {}\n", "x".repeat(40));
    assert_eq!(read(&path), line(7));
    assert_eq!(read(&dir.path().join("app.log.1")), line(5) + &line(6));
    assert_eq!(read(&dir.path().join("app.log.2")), line(3) + &line(4));
    assert!(!dir.path().join("app.log.3").exists());
}

#[test]
fn time_rotation_renames_with_timestamp_suffix() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("svc.log");
    let engine = WriteEngine::new("time-rotation", 64).unwrap();
    let logger = Logger::builder("timed")
        .flags(Flags::empty())
        .handler(Handler::time_rotating(&path, When::Second, 1, &engine).unwrap())
        .build()
        .unwrap();

    info!(logger, "before");
    wait_for_written(&engine, 1);
    thread::sleep(Duration::from_millis(1100));
    info!(logger, "after");
    engine.close();
    logger.close().unwrap();

    assert_eq!(read(&path), "after\n");
    let rotated: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .filter(|name| name != "svc.log")
        .collect();
    // An open at the very end of a second can rotate once more, leaving
    // an empty file behind.
    assert!(!rotated.is_empty());
    let mut archived = String::new();
    for name in &rotated {
        let suffix = name.strip_prefix("svc.log").unwrap();
        assert!(
            chrono::NaiveDateTime::parse_from_str(suffix, When::Second.suffix()).is_ok(),
            "unexpected suffix {suffix}"
        );
        archived.push_str(&read(&dir.path().join(name)));
    }
    assert_eq!(archived, "before\n");
}

#[test]
fn clones_write_through_their_own_descriptor() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.log");
    let engine = WriteEngine::new("clone-descriptor", 64).unwrap();
    let logger = Logger::builder("parent")
        .flags(Flags::empty())
        .handler(Handler::file(&path, &engine).unwrap())
        .build()
        .unwrap();
    let child = logger.with_field("job", "nightly").unwrap();

    info!(logger, "text line");
    info!(child, "json line");
    engine.close();

    // Closing the parent must not affect the child's descriptor.
    logger.close().unwrap();
    let contents = read(&path);
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some("text line"));
    let json: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
    assert_eq!(json["job"], "nightly");
    assert_eq!(json["msg"], "json line");
    child.close().unwrap();
}
