//! Capture tracing output for assertions
//!
//! Installs a subscriber for the current thread only, so captures from
//! parallel tests do not mix.

use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Captured "[LEVEL] message" lines
pub type CapturedLogs = Arc<Mutex<Vec<String>>>;

struct LogCapture {
    lines: CapturedLogs,
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor { message: None };
        event.record(&mut visitor);
        if let Some(message) = visitor.message {
            let line = format!("[{}] {}", event.metadata().level(), message);
            self.lines.lock().unwrap().push(line);
        }
    }
}

struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        }
    }
}

/// Run `f` with every event on this thread recorded
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
    let lines = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(LogCapture {
        lines: Arc::clone(&lines),
    });
    let result = tracing::subscriber::with_default(subscriber, f);
    let captured = lines.lock().unwrap().clone();
    (result, captured)
}

/// Whether any captured line contains `needle`
pub fn contains(lines: &[String], needle: &str) -> bool {
    lines.iter().any(|line| line.contains(needle))
}
