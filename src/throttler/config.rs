//! Transaction throttler configuration
//!
//! Disabled by default. When disabled the gate admits everything and never
//! builds a throttler.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{ThrottlerError, ThrottlerResult};

/// Tablet role as reported by health checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabletType {
    Primary,
    Replica,
    Rdonly,
}

impl fmt::Display for TabletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TabletType::Primary => write!(f, "primary"),
            TabletType::Replica => write!(f, "replica"),
            TabletType::Rdonly => write!(f, "rdonly"),
        }
    }
}

/// Rate-control parameters handed to the underlying throttler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlerConfiguration {
    /// Lag at or below which the rate may grow
    pub target_replication_lag_sec: u64,
    /// Lag above which the rate is cut hard
    pub max_replication_lag_sec: u64,
    /// Transactions per second admitted before any lag is observed
    pub initial_rate: u64,
    /// Fraction the rate grows by per healthy observation
    pub max_increase: f64,
    /// Fraction the rate shrinks by per lagging observation
    pub emergency_decrease: f64,
}

impl Default for ThrottlerConfiguration {
    fn default() -> Self {
        Self {
            target_replication_lag_sec: 2,
            max_replication_lag_sec: 10,
            initial_rate: 100,
            max_increase: 1.0,
            emergency_decrease: 0.5,
        }
    }
}

impl ThrottlerConfiguration {
    pub fn validate(&self) -> ThrottlerResult<()> {
        if self.target_replication_lag_sec == 0 {
            return Err(ThrottlerError::configuration(
                "target_replication_lag_sec must be > 0",
            ));
        }
        if self.target_replication_lag_sec > self.max_replication_lag_sec {
            return Err(ThrottlerError::configuration(format!(
                "target_replication_lag_sec ({}) must not exceed max_replication_lag_sec ({})",
                self.target_replication_lag_sec, self.max_replication_lag_sec
            )));
        }
        if self.initial_rate == 0 {
            return Err(ThrottlerError::configuration("initial_rate must be > 0"));
        }
        if !(self.max_increase > 0.0 && self.max_increase <= 1.0) {
            return Err(ThrottlerError::configuration(
                "max_increase must be in (0, 1]",
            ));
        }
        if !(self.emergency_decrease > 0.0 && self.emergency_decrease <= 1.0) {
            return Err(ThrottlerError::configuration(
                "emergency_decrease must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Transaction throttler configuration
///
/// Configured externally, immutable after the gate is built.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TxThrottlerConfig {
    /// Whether the gate is active
    pub enabled: bool,

    /// Cells whose tablets are watched for replication lag
    pub healthcheck_cells: Vec<String>,

    /// Tablet types whose lag feeds the throttler.
    ///
    /// `None` disables lag recording entirely.
    pub tablet_types: Option<Vec<TabletType>>,

    pub throttler: ThrottlerConfiguration,
}

impl TxThrottlerConfig {
    /// Disabled configuration (default)
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Enabled configuration watching `cells`, recording replica lag
    pub fn enabled(cells: Vec<String>) -> Self {
        Self {
            enabled: true,
            healthcheck_cells: cells,
            tablet_types: Some(vec![TabletType::Replica]),
            throttler: ThrottlerConfiguration::default(),
        }
    }

    pub fn from_json_str(content: &str) -> ThrottlerResult<Self> {
        let config: TxThrottlerConfig = serde_json::from_str(content)
            .map_err(|e| ThrottlerError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// A disabled configuration is always valid.
    pub fn validate(&self) -> ThrottlerResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.healthcheck_cells.iter().any(|c| c.trim().is_empty()) {
            return Err(ThrottlerError::configuration(
                "healthcheck_cells must not contain empty cell names",
            ));
        }
        self.throttler.validate()
    }

    /// Whether lag reported by a tablet of this type is recorded
    pub fn records(&self, tablet_type: TabletType) -> bool {
        self.tablet_types
            .as_ref()
            .map(|types| types.contains(&tablet_type))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_default() {
        let config = TxThrottlerConfig::default();
        assert!(!config.enabled);
        assert_eq!(config, TxThrottlerConfig::disabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = TxThrottlerConfig::from_json_str(
            r#"{"enabled": true, "healthcheck_cells": ["zone1"], "tablet_types": ["replica", "rdonly"]}"#,
        )
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.throttler, ThrottlerConfiguration::default());
        assert!(config.records(TabletType::Rdonly));
        assert!(!config.records(TabletType::Primary));
    }

    #[test]
    fn test_validate_rejects_inverted_lag_bounds() {
        let mut config = TxThrottlerConfig::enabled(vec!["zone1".into()]);
        config.throttler.target_replication_lag_sec = 20;
        assert!(matches!(
            config.validate(),
            Err(ThrottlerError::Configuration(_))
        ));

        // a disabled gate is never validated further
        config.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fractions() {
        let mut config = TxThrottlerConfig::enabled(vec!["zone1".into()]);
        config.throttler.emergency_decrease = 0.0;
        assert!(config.validate().is_err());

        config.throttler.emergency_decrease = 0.5;
        config.throttler.max_increase = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_no_tablet_types_records_nothing() {
        let mut config = TxThrottlerConfig::enabled(vec!["zone1".into()]);
        config.tablet_types = None;
        assert!(!config.records(TabletType::Replica));
    }
}
