//! Observability subsystem
//!
//! - Structured logging through `tracing`, one typed `Event` per record
//! - Atomic metrics counters
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. Deterministic output: fields are emitted sorted by key
//!
//! The library never installs a subscriber.
//!
//! # Usage
//!
//! ```ignore
//! use boundorm::observability::{log_event, Event};
//!
//! log_event(Event::PageRead, &[("table", "posts"), ("rows", "10")]);
//! ```

mod events;
mod metrics;

pub use events::Event;
pub use metrics::{EngineMetrics, MetricsSnapshot};

use tracing::{info, warn};

/// Renders fields as `key=value` pairs sorted by key
pub fn format_fields(fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log a lifecycle event with fields
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let rendered = format_fields(fields);
    if event.is_warning() {
        warn!(event = event.as_str(), fields = %rendered, "{}", event);
    } else {
        info!(event = event.as_str(), fields = %rendered, "{}", event);
    }
}
