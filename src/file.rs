use crate::error::LogError;
use crate::sink::{closed_error, Sink};
use chrono::{Local, TimeZone};
use serde::Deserialize;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Appends to a single file, creating it (and its parent directory) if
/// missing.
#[derive(Debug)]
pub struct FileHandler {
    path: PathBuf,
    file: Option<File>,
}

impl FileHandler {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| LogError::Open {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let file = open_append(&path).map_err(|source| LogError::Open {
            path: path.clone(),
            source,
        })?;

        Ok(FileHandler {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn size(&self) -> io::Result<u64> {
        self.current()?.metadata().map(|meta| meta.len())
    }

    fn modified(&self) -> io::Result<SystemTime> {
        self.current()?.metadata()?.modified()
    }

    fn current(&self) -> io::Result<&File> {
        self.file.as_ref().ok_or_else(|| closed_error("file handler"))
    }

    fn release(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(file) => file.sync_all(),
            None => Ok(()),
        }
    }

    fn reopen(&mut self) -> io::Result<()> {
        self.release()?;
        self.file = Some(open_append(&self.path)?);
        Ok(())
    }
}

impl Sink for FileHandler {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = self.file.as_mut().ok_or_else(|| closed_error("file handler"))?;
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.release()
    }

    fn try_clone(&self) -> Result<Box<dyn Sink>, LogError> {
        Ok(Box::new(FileHandler::open(&self.path)?))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `path` with `suffix` appended to the final component.
fn with_suffix(path: &Path, suffix: impl AsRef<str>) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix.as_ref());
    PathBuf::from(name)
}

/// Rename that tolerates a missing source, used when shifting backups
/// that have not been created yet.
fn rename_if_exists(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Keeps a file below `max_bytes`, moving full files to numbered
/// backups `name.1 .. name.<backup_count>`.
///
/// Before every write: if the live file has reached `max_bytes`, backups
/// shift up by one (the oldest is overwritten), the live file becomes
/// `name.1` and a fresh file is opened. With `backup_count == 0` the file
/// is never rotated and grows without bound.
#[derive(Debug)]
pub struct SizeRotatingFileHandler {
    file: FileHandler,
    max_bytes: u64,
    backup_count: u32,
}

impl SizeRotatingFileHandler {
    pub fn open(path: impl AsRef<Path>, max_bytes: u64, backup_count: u32) -> Result<Self, LogError> {
        if max_bytes == 0 {
            return Err(LogError::InvalidMaxBytes);
        }

        Ok(SizeRotatingFileHandler {
            file: FileHandler::open(path)?,
            max_bytes,
            backup_count,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Path of the `index`-th backup.
    pub fn backup_path(&self, index: u32) -> PathBuf {
        with_suffix(self.file.path(), format!(".{index}"))
    }

    fn should_rollover(&self) -> bool {
        if self.backup_count == 0 {
            return false;
        }
        match self.file.size() {
            Ok(size) => size >= self.max_bytes,
            Err(_) => false,
        }
    }

    fn rollover(&mut self) -> io::Result<()> {
        let mut result = self.file.release();

        for index in (1..self.backup_count).rev() {
            let shifted = rename_if_exists(&self.backup_path(index), &self.backup_path(index + 1));
            result = result.and(shifted);
        }
        result = result.and(fs::rename(self.file.path(), self.backup_path(1)));

        // Reopen even if a rename failed so the handler keeps writing.
        self.file.reopen()?;
        result
    }
}

impl Sink for SizeRotatingFileHandler {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.should_rollover() {
            match self.rollover() {
                Ok(()) => tracing::debug!(path = %self.file.path().display(), "rotated log file by size"),
                Err(err) if self.file.is_open() => {
                    tracing::warn!(path = %self.file.path().display(), error = %err, "size rotation failed")
                }
                Err(err) => return Err(err),
            }
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.close()
    }

    fn try_clone(&self) -> Result<Box<dyn Sink>, LogError> {
        Ok(Box::new(SizeRotatingFileHandler::open(
            self.file.path(),
            self.max_bytes,
            self.backup_count,
        )?))
    }

    fn describe(&self) -> String {
        self.file.describe()
    }
}

/// Unit of a [`TimeRotatingFileHandler`] interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum When {
    Second,
    Minute,
    Hour,
    Day,
}

impl When {
    pub fn seconds(self) -> i64 {
        match self {
            When::Second => 1,
            When::Minute => 60,
            When::Hour => 3600,
            When::Day => 24 * 3600,
        }
    }

    /// `chrono` format appended to the base name of a rotated file.
    pub fn suffix(self) -> &'static str {
        match self {
            When::Second => "%Y-%m-%d_%H-%M-%S",
            When::Minute => "%Y-%m-%d_%H-%M",
            When::Hour => "%Y-%m-%d_%H",
            When::Day => "%Y-%m-%d",
        }
    }
}

/// Starts a new file every `interval` units of time.
///
/// The first rollover is due one interval after the live file's
/// modification time. A rotated file is renamed to the base name followed
/// by the rotation time formatted with [`When::suffix`].
#[derive(Debug)]
pub struct TimeRotatingFileHandler {
    file: FileHandler,
    when: When,
    multiplier: u32,
    interval: i64,
    rollover_at: i64,
}

impl TimeRotatingFileHandler {
    pub fn open(path: impl AsRef<Path>, when: When, multiplier: u32) -> Result<Self, LogError> {
        if multiplier == 0 {
            return Err(LogError::InvalidInterval(multiplier));
        }

        let file = FileHandler::open(path)?;
        let interval = when.seconds() * i64::from(multiplier);
        let modified = file
            .modified()
            .ok()
            .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
            .map(|since| since.as_secs() as i64)
            .unwrap_or_else(|| Local::now().timestamp());

        Ok(TimeRotatingFileHandler {
            file,
            when,
            multiplier,
            interval,
            rollover_at: modified + interval,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Unix time (seconds) of the next rollover.
    pub fn rollover_at(&self) -> i64 {
        self.rollover_at
    }

    /// Path the live file is renamed to when rotated at `at`.
    pub fn rotated_path<Tz: TimeZone>(&self, at: &chrono::DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: std::fmt::Display,
    {
        with_suffix(self.file.path(), at.format(self.when.suffix()).to_string())
    }

    fn rollover(&mut self, now: chrono::DateTime<Local>) -> io::Result<()> {
        let target = self.rotated_path(&now);
        let result = self
            .file
            .release()
            .and(fs::rename(self.file.path(), &target));
        self.rollover_at = now.timestamp() + self.interval;
        self.file.reopen()?;
        result
    }
}

impl Sink for TimeRotatingFileHandler {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let now = Local::now();
        if self.rollover_at <= now.timestamp() {
            match self.rollover(now) {
                Ok(()) => tracing::debug!(path = %self.file.path().display(), "rotated log file by time"),
                Err(err) if self.file.is_open() => {
                    tracing::warn!(path = %self.file.path().display(), error = %err, "time rotation failed")
                }
                Err(err) => return Err(err),
            }
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.close()
    }

    fn try_clone(&self) -> Result<Box<dyn Sink>, LogError> {
        Ok(Box::new(TimeRotatingFileHandler::open(
            self.file.path(),
            self.when,
            self.multiplier,
        )?))
    }

    fn describe(&self) -> String {
        self.file.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn file_handler_creates_parent_and_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/app.log");

        let mut handler = FileHandler::open(&path).unwrap();
        handler.write(b"first\n").unwrap();
        handler.close().unwrap();
        assert!(!handler.is_open());
        assert!(handler.write(b"late\n").is_err());

        let mut again = FileHandler::open(&path).unwrap();
        again.write(b"second\n").unwrap();
        again.close().unwrap();

        assert_eq!(read(&path), "first\nsecond\n");
    }

    #[test]
    fn clones_get_their_own_descriptor() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");

        let mut original = FileHandler::open(&path).unwrap();
        let mut clone = original.try_clone().unwrap();
        original.close().unwrap();

        clone.write(b"still open\n").unwrap();
        clone.close().unwrap();
        assert_eq!(read(&path), "still open\n");
    }

    #[test]
    fn size_rotation_shifts_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut handler = SizeRotatingFileHandler::open(&path, 100, 2).unwrap();

        let big = vec![b'a'; 101];
        handler.write(&big).unwrap();
        assert!(!handler.backup_path(1).exists());

        handler.write(b"second\n").unwrap();
        assert_eq!(read(&handler.backup_path(1)).len(), 101);
        assert_eq!(read(&path), "second\n");

        handler.write(&vec![b'b'; 100]).unwrap();
        handler.write(b"third\n").unwrap();
        assert_eq!(read(&path), "third\n");
        assert!(read(&handler.backup_path(1)).starts_with("second\n"));
        assert_eq!(read(&handler.backup_path(2)).len(), 101);
        assert!(!handler.backup_path(3).exists());
    }

    #[test]
    fn size_rotation_drops_backups_beyond_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut handler = SizeRotatingFileHandler::open(&path, 4, 2).unwrap();

        for chunk in ["1111", "2222", "3333", "4444"] {
            handler.write(chunk.as_bytes()).unwrap();
        }
        assert_eq!(read(&path), "4444");
        assert_eq!(read(&handler.backup_path(1)), "3333");
        assert_eq!(read(&handler.backup_path(2)), "2222");
        assert!(!handler.backup_path(3).exists());
    }

    #[test]
    fn size_rotation_triggers_exactly_at_threshold() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut handler = SizeRotatingFileHandler::open(&path, 10, 1).unwrap();

        handler.write(b"123456789").unwrap();
        handler.write(b"0").unwrap();
        assert!(!handler.backup_path(1).exists(), "size 9 is below threshold");

        handler.write(b"x").unwrap();
        assert_eq!(read(&handler.backup_path(1)), "1234567890");
        assert_eq!(read(&path), "x");
    }

    #[test]
    fn zero_backup_count_never_rotates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut handler = SizeRotatingFileHandler::open(&path, 10, 0).unwrap();

        for _ in 0..5 {
            handler.write(b"0123456789").unwrap();
        }
        assert_eq!(read(&path).len(), 50);
        assert!(!handler.backup_path(1).exists());
    }

    #[test]
    fn zero_max_bytes_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = SizeRotatingFileHandler::open(dir.path().join("app.log"), 0, 3).unwrap_err();
        assert!(matches!(err, LogError::InvalidMaxBytes));
    }

    #[test]
    fn time_rotation_seeds_from_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let before = Local::now().timestamp();
        let handler = TimeRotatingFileHandler::open(&path, When::Hour, 2).unwrap();

        let due = handler.rollover_at();
        assert!(due >= before + 7200 - 1 && due <= Local::now().timestamp() + 7200);
    }

    #[test]
    fn time_rotation_renames_with_suffix_and_reschedules() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut handler = TimeRotatingFileHandler::open(&path, When::Minute, 1).unwrap();

        handler.write(b"old\n").unwrap();
        handler.rollover_at = 0;
        let now = Local::now();
        handler.write(b"new\n").unwrap();

        assert_eq!(read(&path), "new\n");
        let rotated: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p != &path)
            .collect();
        assert_eq!(rotated.len(), 1);
        let name = rotated[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("app.log"));
        assert_eq!(name.len(), "app.log".len() + "2024-01-01_10-00".len());
        assert_eq!(read(&rotated[0]), "old\n");
        assert!(handler.rollover_at() >= now.timestamp() + 60);
    }

    #[test]
    fn suffix_granularity_follows_unit() {
        let dir = TempDir::new().unwrap();
        let handler = TimeRotatingFileHandler::open(dir.path().join("x"), When::Second, 1).unwrap();
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert!(handler
            .rotated_path(&at)
            .to_string_lossy()
            .ends_with("x2024-03-09_07-05-01"));
        assert_eq!(When::Day.suffix(), "%Y-%m-%d");
        assert_eq!(When::Hour.seconds(), 3600);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = TimeRotatingFileHandler::open(dir.path().join("x"), When::Day, 0).unwrap_err();
        assert!(matches!(err, LogError::InvalidInterval(0)));
    }
}
