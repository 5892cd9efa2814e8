use crate::error::FormatError;
use crate::level::Flags;
use crate::record::Record;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Separator between the prefix parts written by [`TextLineFormatter`].
pub const FIELD_SPLIT: &str = " - ";

const KEY_FILE: &str = "file";
const KEY_LEVEL: &str = "level";
const KEY_MSG: &str = "msg";
const KEY_TIME: &str = "time";

/// Turns a [`Record`] into bytes appended to `buf`.
///
/// Implementations run on the write engine's worker thread. On `Err` the
/// engine discards whatever was appended, counts a formatting error and
/// retries the record with [`TextLineFormatter`].
pub trait Formatter: Send + Sync {
    fn format(&self, buf: &mut Vec<u8>, record: &Record) -> Result<(), FormatError>;

    /// Short name used in diagnostics.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// `time - LEVEL - source - message\n`, with each prefix part present only
/// when the record's [`Flags`] ask for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLineFormatter;

impl Formatter for TextLineFormatter {
    fn format(&self, buf: &mut Vec<u8>, record: &Record) -> Result<(), FormatError> {
        if record.flags.contains(Flags::TIME) {
            buf.extend_from_slice(record.timestamp.as_bytes());
            buf.extend_from_slice(FIELD_SPLIT.as_bytes());
        }
        if record.flags.contains(Flags::LEVEL) {
            buf.extend_from_slice(record.level.as_str().as_bytes());
            buf.extend_from_slice(FIELD_SPLIT.as_bytes());
        }
        if record.flags.contains(Flags::SOURCE) {
            buf.extend_from_slice(record.source.as_bytes());
            buf.extend_from_slice(FIELD_SPLIT.as_bytes());
        }

        buf.extend_from_slice(record.message.trim_end_matches('\n').as_bytes());
        buf.push(b'\n');
        Ok(())
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

/// One JSON object per line.
///
/// Without attached fields the object is `{"file","level","msg","time"}`.
/// With fields, the same four keys are merged into the field map and take
/// precedence over user keys of the same name.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

#[derive(Serialize)]
struct PlainLine<'a> {
    file: &'a str,
    level: &'a str,
    msg: &'a str,
    time: &'a str,
}

#[derive(Serialize)]
#[serde(untagged)]
enum FieldRef<'a> {
    Str(&'a str),
    Value(&'a serde_json::Value),
}

/// Empty unless the record's flags include [`Flags::LEVEL`], like `file`
/// and `time`.
fn level_name(record: &Record) -> &'static str {
    if record.flags.contains(Flags::LEVEL) {
        record.level.as_str()
    } else {
        ""
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, buf: &mut Vec<u8>, record: &Record) -> Result<(), FormatError> {
        match record.fields.as_deref() {
            Some(fields) if !fields.is_empty() => {
                let mut merged: BTreeMap<&str, FieldRef<'_>> = fields
                    .iter()
                    .map(|(k, v)| (k.as_str(), FieldRef::Value(v)))
                    .collect();
                merged.insert(KEY_FILE, FieldRef::Str(&record.source));
                merged.insert(KEY_TIME, FieldRef::Str(&record.timestamp));
                merged.insert(KEY_LEVEL, FieldRef::Str(level_name(record)));
                merged.insert(KEY_MSG, FieldRef::Str(&record.message));
                serde_json::to_writer(&mut *buf, &merged)?;
            }
            _ => {
                let line = PlainLine {
                    file: &record.source,
                    level: level_name(record),
                    msg: &record.message,
                    time: &record.timestamp,
                };
                serde_json::to_writer(&mut *buf, &line)?;
            }
        }
        buf.push(b'\n');
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Shared text-line formatter instance.
pub fn text() -> Arc<dyn Formatter> {
    static TEXT: OnceLock<Arc<dyn Formatter>> = OnceLock::new();
    Arc::clone(TEXT.get_or_init(|| Arc::new(TextLineFormatter)))
}

/// Shared JSON formatter instance.
pub fn json() -> Arc<dyn Formatter> {
    static JSON: OnceLock<Arc<dyn Formatter>> = OnceLock::new();
    Arc::clone(JSON.get_or_init(|| Arc::new(JsonFormatter)))
}
