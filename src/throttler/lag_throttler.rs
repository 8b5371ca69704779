//! Replication-lag driven rate limiter
//!
//! Admits up to `max_rate` requests per one-second window. Each lag
//! observation moves the rate: above the max lag it is cut by
//! `emergency_decrease`, at or below the target lag it grows by
//! `max_increase`, and in between it holds. The rate never drops below 1.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::config::ThrottlerConfiguration;
use super::errors::ThrottlerResult;
use super::tx_throttler::{TabletHealth, Throttler, ThrottlerSettings};

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send>;

pub struct LagThrottler {
    initial: ThrottlerConfiguration,
    config: ThrottlerConfiguration,
    max_rate: u64,
    rate_cap: Option<u64>,
    window_start: DateTime<Utc>,
    admitted: u64,
    last_observation: Option<DateTime<Utc>>,
    closed: bool,
    clock: Clock,
}

impl LagThrottler {
    pub fn new(config: ThrottlerConfiguration) -> ThrottlerResult<Self> {
        config.validate()?;
        Ok(Self {
            max_rate: config.initial_rate,
            initial: config.clone(),
            config,
            rate_cap: None,
            window_start: Utc::now(),
            admitted: 0,
            last_observation: None,
            closed: false,
            clock: Box::new(Utc::now),
        })
    }

    pub fn from_settings(settings: &ThrottlerSettings) -> ThrottlerResult<Self> {
        let mut throttler = Self::new(settings.config.clone())?;
        throttler.rate_cap = settings.max_rate;
        Ok(throttler)
    }

    /// Replaces the wall clock
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + 'static) -> Self {
        self.window_start = clock();
        self.clock = Box::new(clock);
        self
    }

    fn effective_rate(&self) -> u64 {
        match self.rate_cap {
            Some(cap) => self.max_rate.min(cap),
            None => self.max_rate,
        }
    }

    fn merge(&self, update: &ThrottlerConfiguration) -> ThrottlerConfiguration {
        let mut merged = self.config.clone();
        if update.target_replication_lag_sec != 0 {
            merged.target_replication_lag_sec = update.target_replication_lag_sec;
        }
        if update.max_replication_lag_sec != 0 {
            merged.max_replication_lag_sec = update.max_replication_lag_sec;
        }
        if update.initial_rate != 0 {
            merged.initial_rate = update.initial_rate;
        }
        if update.max_increase != 0.0 {
            merged.max_increase = update.max_increase;
        }
        if update.emergency_decrease != 0.0 {
            merged.emergency_decrease = update.emergency_decrease;
        }
        merged
    }
}

impl Throttler for LagThrottler {
    fn throttle(&mut self, _thread_id: usize) -> Duration {
        if self.closed {
            return Duration::ZERO;
        }
        let window = chrono::Duration::seconds(1);
        let now = (self.clock)();
        let elapsed = now - self.window_start;
        if elapsed >= window || elapsed < chrono::Duration::zero() {
            self.window_start = now;
            self.admitted = 0;
        }
        if self.admitted < self.effective_rate() {
            self.admitted += 1;
            return Duration::ZERO;
        }
        let remaining = window - (now - self.window_start);
        remaining
            .to_std()
            .unwrap_or_default()
            .max(Duration::from_millis(1))
    }

    /// Single-threaded: nothing to release
    fn thread_finished(&mut self, _thread_id: usize) {}

    fn close(&mut self) {
        self.closed = true;
    }

    fn max_rate(&self) -> u64 {
        self.max_rate
    }

    fn set_max_rate(&mut self, rate: u64) {
        self.max_rate = rate;
    }

    fn record_replication_lag(&mut self, at: DateTime<Utc>, health: &TabletHealth) {
        if !health.serving {
            return;
        }
        // out-of-order reports would undo newer adjustments
        if matches!(self.last_observation, Some(last) if at < last) {
            return;
        }
        self.last_observation = Some(at);

        let lag = health.replication_lag_sec;
        let rate = self.max_rate as f64;
        if lag > self.config.max_replication_lag_sec {
            let cut = (rate * (1.0 - self.config.emergency_decrease)).floor() as u64;
            self.max_rate = cut.max(1);
        } else if lag <= self.config.target_replication_lag_sec {
            let step = ((rate * self.config.max_increase).floor() as u64).max(1);
            self.max_rate = self.max_rate.saturating_add(step);
        }
    }

    fn get_configuration(&self) -> ThrottlerConfiguration {
        self.config.clone()
    }

    fn update_configuration(
        &mut self,
        config: &ThrottlerConfiguration,
        copy_zero_values: bool,
    ) -> ThrottlerResult<()> {
        let next = if copy_zero_values {
            config.clone()
        } else {
            self.merge(config)
        };
        next.validate()?;
        if next.initial_rate != self.config.initial_rate {
            self.max_rate = next.initial_rate;
        }
        self.config = next;
        Ok(())
    }

    fn reset_configuration(&mut self) {
        self.config = self.initial.clone();
        self.max_rate = self.initial.initial_rate;
    }
}
