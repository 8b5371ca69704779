//! Planner and throttler counters
//!
//! - Counters only increase, except the `throttler_running` flag
//! - Relaxed atomics; values are exact but not ordered with other memory

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Registry of operational counters
///
/// Shared by reference between the planner context and the throttler.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Plans that went through the finalize pass
    plans_finalized: AtomicU64,
    /// Plans rejected with a user-facing error
    plans_rejected: AtomicU64,
    invariant_violations: AtomicU64,
    throttle_requests: AtomicU64,
    throttle_throttled: AtomicU64,
    /// 1 while the throttler is open
    throttler_running: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_plans_finalized(&self) {
        self.plans_finalized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_plans_rejected(&self) {
        self.plans_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_invariant_violations(&self) {
        self.invariant_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_throttle_requests(&self) {
        self.throttle_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_throttle_throttled(&self) {
        self.throttle_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_throttler_running(&self, running: bool) {
        self.throttler_running
            .store(u64::from(running), Ordering::Relaxed);
    }

    pub fn plans_finalized(&self) -> u64 {
        self.plans_finalized.load(Ordering::Relaxed)
    }

    pub fn plans_rejected(&self) -> u64 {
        self.plans_rejected.load(Ordering::Relaxed)
    }

    pub fn invariant_violations(&self) -> u64 {
        self.invariant_violations.load(Ordering::Relaxed)
    }

    pub fn throttle_requests(&self) -> u64 {
        self.throttle_requests.load(Ordering::Relaxed)
    }

    pub fn throttle_throttled(&self) -> u64 {
        self.throttle_throttled.load(Ordering::Relaxed)
    }

    pub fn throttler_running(&self) -> bool {
        self.throttler_running.load(Ordering::Relaxed) == 1
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            plans_finalized: self.plans_finalized(),
            plans_rejected: self.plans_rejected(),
            invariant_violations: self.invariant_violations(),
            throttle_requests: self.throttle_requests(),
            throttle_throttled: self.throttle_throttled(),
            throttler_running: self.throttler_running(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Copy of the counters at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub plans_finalized: u64,
    pub plans_rejected: u64,
    pub invariant_violations: u64,
    pub throttle_requests: u64,
    pub throttle_throttled: u64,
    pub throttler_running: bool,
}
