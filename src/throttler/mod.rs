//! Transaction throttling gate
//!
//! Holds back transactions while replicas lag. Consumed by the execution
//! layer, never by the planner.
//!
//! # Collaborators
//!
//! - `Throttler`: rate controller (`LagThrottler` is the built-in one)
//! - `HealthCheck`: source of tablet health reports
//! - `TopologyWatcher`: one per health-check cell
//!
//! All are built through `TxThrottlerFactories`, so tests swap them out
//! without touching process-wide state.

mod config;
mod errors;
mod lag_throttler;
mod tx_throttler;

pub use config::{TabletType, ThrottlerConfiguration, TxThrottlerConfig};
pub use errors::{ThrottlerError, ThrottlerResult};
pub use lag_throttler::LagThrottler;
pub use tx_throttler::{
    HealthCheck, HealthCheckFactory, PriorityRoll, TabletHealth, Target, Throttler,
    ThrottlerFactory, ThrottlerSettings, TopologyWatcher, TopologyWatcherFactory, TxThrottler,
    TxThrottlerFactories, MAX_PRIORITY_VALUE,
};
