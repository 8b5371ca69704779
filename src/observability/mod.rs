//! Observability for planning and transaction throttling
//!
//! - Structured JSON logging
//! - Typed point events and begin/complete scopes
//! - Atomic counters
//!
//! Observability is read-only: nothing here changes a planning outcome.
//!
//! ```ignore
//! use shardplan::observability::{log_event_with_fields, Event, MetricsRegistry};
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_plans_rejected();
//! log_event_with_fields(Event::PlanRejected, &[("code", "PLAN_UNSUPPORTED_PUSHDOWN")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

fn severity_for(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else if event.is_error() {
        Severity::Error
    } else {
        Severity::Info
    }
}

/// Log a point event
pub fn log_event(event: Event) {
    Logger::log(severity_for(event), event.as_str(), &[]);
}

/// Log a point event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_for(event), event.as_str(), fields);
}
