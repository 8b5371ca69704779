//! Transaction admission gate
//!
//! Decides whether a transaction should be held back while replicas lag.
//! The gate owns nothing about rate control itself: it builds a `Throttler`,
//! a health check and per-cell topology watchers through injected factories,
//! feeds replication lag into the throttler and asks it for a verdict.
//!
//! Lifecycle: `new` -> `init_db_config` -> `open` -> (`throttle` /
//! `record_health`)* -> `close`. A disabled gate never builds anything and
//! admits every transaction.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

use super::config::{TabletType, ThrottlerConfiguration, TxThrottlerConfig};
use super::errors::{ThrottlerError, ThrottlerResult};
use super::lag_throttler::LagThrottler;

/// Exclusive upper bound of the priority roll
pub const MAX_PRIORITY_VALUE: u32 = 100;

const THROTTLER_NAME: &str = "TransactionThrottler";
const THROTTLER_UNIT: &str = "TPS";

/// Shard a tablet serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub keyspace: String,
    pub shard: String,
    pub tablet_type: TabletType,
}

impl Target {
    pub fn new(keyspace: impl Into<String>, shard: impl Into<String>, tablet_type: TabletType) -> Self {
        Self {
            keyspace: keyspace.into(),
            shard: shard.into(),
            tablet_type,
        }
    }
}

/// One health report from a tablet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabletHealth {
    pub target: Target,
    pub serving: bool,
    pub replication_lag_sec: u64,
}

/// Parameters a throttler is built with
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottlerSettings {
    pub name: &'static str,
    pub unit: &'static str,
    pub thread_count: usize,
    /// Hard cap on the rate; `None` leaves the rate to lag adaptation alone
    pub max_rate: Option<u64>,
    pub config: ThrottlerConfiguration,
}

/// Rate controller consulted by the gate
pub trait Throttler: Send {
    /// Backoff the caller should wait; zero admits the request
    fn throttle(&mut self, thread_id: usize) -> Duration;

    fn thread_finished(&mut self, thread_id: usize);

    fn close(&mut self);

    fn max_rate(&self) -> u64;

    fn set_max_rate(&mut self, rate: u64);

    fn record_replication_lag(&mut self, at: DateTime<Utc>, health: &TabletHealth);

    fn get_configuration(&self) -> ThrottlerConfiguration;

    /// Replaces the configuration.
    ///
    /// Without `copy_zero_values`, zero fields in `config` keep their current
    /// value.
    fn update_configuration(
        &mut self,
        config: &ThrottlerConfiguration,
        copy_zero_values: bool,
    ) -> ThrottlerResult<()>;

    fn reset_configuration(&mut self);
}

/// Source of tablet health reports for a set of cells
pub trait HealthCheck: Send {
    fn close(&mut self);
}

/// Keeps the health check's tablet list in sync for one cell
pub trait TopologyWatcher: Send {
    fn start(&mut self);
    fn stop(&mut self);
}

pub type ThrottlerFactory =
    Box<dyn Fn(&ThrottlerSettings) -> ThrottlerResult<Box<dyn Throttler>> + Send + Sync>;
pub type HealthCheckFactory =
    Box<dyn Fn(&[String]) -> ThrottlerResult<Box<dyn HealthCheck>> + Send + Sync>;
pub type TopologyWatcherFactory =
    Box<dyn Fn(&str, &Target) -> ThrottlerResult<Box<dyn TopologyWatcher>> + Send + Sync>;
pub type PriorityRoll = Box<dyn Fn() -> u32 + Send + Sync>;

/// Constructors the gate builds its collaborators with
pub struct TxThrottlerFactories {
    pub throttler: ThrottlerFactory,
    pub health_check: HealthCheckFactory,
    pub topology_watcher: TopologyWatcherFactory,
    /// Uniform draw in `[0, MAX_PRIORITY_VALUE)`
    pub priority_roll: PriorityRoll,
}

impl TxThrottlerFactories {
    /// Factories backed by `LagThrottler` and a random priority roll
    pub fn new(health_check: HealthCheckFactory, topology_watcher: TopologyWatcherFactory) -> Self {
        Self {
            throttler: Box::new(|settings| {
                Ok(Box::new(LagThrottler::from_settings(settings)?) as Box<dyn Throttler>)
            }),
            health_check,
            topology_watcher,
            priority_roll: Box::new(|| rand::thread_rng().gen_range(0..MAX_PRIORITY_VALUE)),
        }
    }

    pub fn with_throttler(mut self, factory: ThrottlerFactory) -> Self {
        self.throttler = factory;
        self
    }

    pub fn with_priority_roll(mut self, roll: PriorityRoll) -> Self {
        self.priority_roll = roll;
        self
    }
}

struct TxThrottlerState {
    throttler: Mutex<Box<dyn Throttler>>,
    health_check: Box<dyn HealthCheck>,
    topology_watchers: Vec<Box<dyn TopologyWatcher>>,
}

impl TxThrottlerState {
    fn lock(&self) -> MutexGuard<'_, Box<dyn Throttler>> {
        self.throttler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn throttle(&self) -> bool {
        // single-threaded from the throttler's point of view
        self.lock().throttle(0) > Duration::ZERO
    }

    fn shutdown(mut self) {
        for watcher in &mut self.topology_watchers {
            watcher.stop();
        }
        self.health_check.close();
        self.lock().close();
    }
}

/// Transaction throttling gate
pub struct TxThrottler {
    config: TxThrottlerConfig,
    factories: TxThrottlerFactories,
    metrics: Arc<MetricsRegistry>,
    target: Option<Target>,
    state: Option<TxThrottlerState>,
}

impl TxThrottler {
    pub fn new(
        config: TxThrottlerConfig,
        factories: TxThrottlerFactories,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        if config.enabled {
            let cells = config.healthcheck_cells.join(",");
            let tablet_types = config
                .tablet_types
                .as_ref()
                .map(|types| {
                    types
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_default();
            log_event_with_fields(
                Event::ThrottlerConfigured,
                &[
                    ("healthcheck_cells", cells.as_str()),
                    ("tablet_types", tablet_types.as_str()),
                ],
            );
        }
        Self {
            config,
            factories,
            metrics,
            target: None,
            state: None,
        }
    }

    /// Records the shard this gate protects
    pub fn init_db_config(&mut self, target: Target) {
        self.target = Some(target);
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Builds the throttler state. No-op when disabled or already open.
    pub fn open(&mut self) -> ThrottlerResult<()> {
        if !self.config.enabled || self.state.is_some() {
            return Ok(());
        }
        let target = self.target.clone().ok_or(ThrottlerError::NoTarget)?;

        let settings = ThrottlerSettings {
            name: THROTTLER_NAME,
            unit: THROTTLER_UNIT,
            thread_count: 1,
            max_rate: None,
            config: self.config.throttler.clone(),
        };
        let mut throttler = (self.factories.throttler)(&settings)?;
        if let Err(e) = throttler.update_configuration(&self.config.throttler, true) {
            throttler.close();
            return Err(e);
        }

        let health_check = match (self.factories.health_check)(&self.config.healthcheck_cells) {
            Ok(hc) => hc,
            Err(e) => {
                throttler.close();
                return Err(e);
            }
        };

        let mut state = TxThrottlerState {
            throttler: Mutex::new(throttler),
            health_check,
            topology_watchers: Vec::with_capacity(self.config.healthcheck_cells.len()),
        };
        for cell in &self.config.healthcheck_cells {
            match (self.factories.topology_watcher)(cell, &target) {
                Ok(mut watcher) => {
                    watcher.start();
                    state.topology_watchers.push(watcher);
                }
                Err(e) => {
                    state.shutdown();
                    return Err(e);
                }
            }
        }

        self.state = Some(state);
        self.metrics.set_throttler_running(true);
        let watchers = self.config.healthcheck_cells.len().to_string();
        log_event_with_fields(
            Event::ThrottlerOpened,
            &[
                ("keyspace", target.keyspace.as_str()),
                ("shard", target.shard.as_str()),
                ("watchers", watchers.as_str()),
            ],
        );
        Ok(())
    }

    /// Tears the state down. No-op when disabled or not open.
    pub fn close(&mut self) {
        if !self.config.enabled {
            return;
        }
        if let Some(state) = self.state.take() {
            state.shutdown();
            self.metrics.set_throttler_running(false);
            log_event_with_fields(Event::ThrottlerClosed, &[]);
        }
    }

    /// Whether a transaction of `priority` should be held back.
    ///
    /// Priority 0 is never throttled; `MAX_PRIORITY_VALUE` always is while
    /// the throttler asks for backoff.
    pub fn throttle(&self, priority: u32) -> bool {
        if !self.config.enabled {
            return false;
        }
        let Some(state) = &self.state else {
            return false;
        };

        let result = state.throttle() && (self.factories.priority_roll)() < priority;

        self.metrics.increment_throttle_requests();
        if result {
            self.metrics.increment_throttle_throttled();
        }
        result
    }

    /// Feeds a health report into the throttler
    pub fn record_health(&self, health: &TabletHealth) {
        let Some(state) = &self.state else {
            return;
        };
        if !self.config.records(health.target.tablet_type) {
            return;
        }
        state.lock().record_replication_lag(Utc::now(), health);
    }

    /// Current admission rate, if open
    pub fn max_rate(&self) -> Option<u64> {
        self.state.as_ref().map(|state| state.lock().max_rate())
    }
}
