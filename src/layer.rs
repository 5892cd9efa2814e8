use crate::level::Level;
use crate::logger::Logger;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

// Events emitted by this crate itself are never fed back into the
// pipeline.
const OWN_TARGET: &str = "log_pipeline";

/// `tracing_subscriber` layer that turns `tracing` events into records
/// and dispatches them through a [`Logger`].
///
/// Only events at or above `min_level` (and enabled on the logger) are
/// forwarded. The event's `message` becomes the record message; other
/// fields are appended as `key=value` pairs. The call never blocks: the
/// logger only enqueues.
pub struct PipelineLayer {
    logger: Arc<Logger>,
    min_level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events handed to the logger.
    pub forwarded_events: Arc<AtomicU64>,
}

impl PipelineLayer {
    pub fn new(logger: Arc<Logger>, min_level: Level) -> Self {
        PipelineLayer {
            logger,
            min_level,
            total_events: Arc::new(AtomicU64::new(0)),
            forwarded_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }
}

impl<S> Layer<S> for PipelineLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if meta.target().starts_with(OWN_TARGET) {
            return;
        }
        let level = Level::from(*meta.level());
        if level < self.min_level || !self.logger.enabled(level) {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let text = render(message, &fields);
        self.logger.log_event(level, meta.file(), meta.line(), &text);
        self.forwarded_events.fetch_add(1, Ordering::Relaxed);
    }
}

/// `message key=value key=value`, with strings unquoted.
fn render(message: Option<String>, fields: &BTreeMap<String, serde_json::Value>) -> String {
    let mut text = message.unwrap_or_default();
    for (key, value) in fields {
        if !text.is_empty() {
            text.push(' ');
        }
        let _ = match value {
            serde_json::Value::String(s) => write!(text, "{key}={s}"),
            other => write!(text, "{key}={other}"),
        };
    }
    text
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, serde_json::Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `format_args!` messages arrive here rather than in `record_str`.
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
        }
    }
}
