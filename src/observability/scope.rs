//! Begin/complete logging around a unit of work
//!
//! - `{NAME}_BEGIN` on creation
//! - `{NAME}_COMPLETE` or `{NAME}_FAILED` when closed explicitly
//! - `{NAME}_INCOMPLETE` warning if dropped while still open

use std::time::Instant;

use super::logger::{Logger, Severity};

/// Logs the boundaries of a unit of work
///
/// ```ignore
/// let scope = ObservationScope::with_fields("PLAN_FINALIZE", &[("plan_id", id)]);
/// // ... walk the tree ...
/// scope.complete_with_fields(&[("operators", "4")]);
/// ```
///
/// Fields given at creation are repeated on the closing line so the two can
/// be correlated.
pub struct ObservationScope {
    name: String,
    fields: Vec<(String, String)>,
    closed: bool,
}

impl ObservationScope {
    pub fn new(name: &str) -> Self {
        Self::with_fields(name, &[])
    }

    pub fn with_fields(name: &str, fields: &[(&str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);
        Self {
            name: name.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            closed: false,
        }
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.close(Severity::Info, "COMPLETE", extra);
    }

    /// Closes the scope at ERROR severity
    pub fn fail(mut self, reason: &str) {
        self.close(Severity::Error, "FAILED", &[("reason", reason)]);
    }

    /// Closes the scope at FATAL severity
    pub fn fail_fatal(mut self, reason: &str) {
        self.close(Severity::Fatal, "FAILED", &[("reason", reason)]);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self, severity: Severity, suffix: &str, extra: &[(&str, &str)]) {
        self.closed = true;
        let mut fields: Vec<(&str, &str)> = self
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        fields.extend_from_slice(extra);
        Logger::log(severity, &format!("{}_{}", self.name, suffix), &fields);
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.closed {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

/// Wall-clock timer for duration fields
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_us(&self) -> String {
        self.start.elapsed().as_micros().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
