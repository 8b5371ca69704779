//! Throttler errors

use thiserror::Error;

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThrottlerError {
    /// Configuration rejected by validation or by the throttler
    #[error("Invalid throttler configuration: {0}")]
    Configuration(String),

    /// An injected factory could not build its component
    #[error("Throttler factory failed: {0}")]
    Factory(String),

    /// Opened before the tablet target was known
    #[error("Throttler opened without a target; call init_db_config first")]
    NoTarget,
}

impl ThrottlerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ThrottlerError::Configuration(message.into())
    }

    pub fn factory(message: impl Into<String>) -> Self {
        ThrottlerError::Factory(message.into())
    }
}
