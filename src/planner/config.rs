//! Planner configuration
//!
//! Loaded once by the embedding process (JSON), immutable afterwards.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{PlannerError, PlannerResult};

/// Planner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Column a vindex leaf routes on (default: "id")
    #[serde(default = "default_routing_column")]
    pub vindex_routing_column: String,

    /// Panic on invariant violations in debug builds (default: false)
    #[serde(default)]
    pub abort_on_invariant_violation: bool,

    /// Log finalize-pass boundaries and invariant violations (default: true).
    /// Metrics are counted either way.
    #[serde(default = "default_log_planning")]
    pub log_planning: bool,
}

fn default_routing_column() -> String {
    "id".to_string()
}

fn default_log_planning() -> bool {
    true
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            vindex_routing_column: default_routing_column(),
            abort_on_invariant_violation: false,
            log_planning: default_log_planning(),
        }
    }
}

impl PlannerConfig {
    /// Quiet configuration for embedding in tests and tools
    pub fn quiet() -> Self {
        Self {
            log_planning: false,
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration document
    pub fn from_json_str(content: &str) -> PlannerResult<Self> {
        let config: PlannerConfig = serde_json::from_str(content).map_err(|e| {
            PlannerError::invalid_config(format!("invalid planner config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from a JSON file
    pub fn load(path: &Path) -> PlannerResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PlannerError::invalid_config(format!(
                "failed to read planner config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> PlannerResult<()> {
        if self.vindex_routing_column.trim().is_empty() {
            return Err(PlannerError::invalid_config(
                "vindex_routing_column must not be empty",
            ));
        }
        Ok(())
    }
}
