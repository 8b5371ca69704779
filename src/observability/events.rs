//! Observable events
//!
//! Point events are typed here. Begin/complete pairs such as
//! `PLAN_FINALIZE_BEGIN` come from `ObservationScope`.

use std::fmt;

/// Observable events of the planner and the transaction throttler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Planning
    /// Query rejected with a user-facing error
    PlanRejected,
    /// The planner broke one of its own invariants
    PlanInvariantViolation,

    // Transaction throttling
    ThrottlerConfigured,
    ThrottlerOpened,
    ThrottlerClosed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::PlanRejected => "PLAN_REJECTED",
            Event::PlanInvariantViolation => "PLAN_INVARIANT_VIOLATION",
            Event::ThrottlerConfigured => "TX_THROTTLER_CONFIGURED",
            Event::ThrottlerOpened => "TX_THROTTLER_OPENED",
            Event::ThrottlerClosed => "TX_THROTTLER_CLOSED",
        }
    }

    /// True if the event reports a broken internal contract
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::PlanInvariantViolation)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Event::PlanRejected)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
