//! Reconnection policy and exponential backoff.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// ReconnectConfig
// ============================================================================

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff. Values below 1.0 are treated as 1.0.
    pub backoff_multiplier: f64,
    /// Maximum number of consecutive attempts (None = infinite).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(15),
            backoff_multiplier: 1.7,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Disables automatic reconnection.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: Some(0),
            ..Self::default()
        }
    }

    /// Calculate delay for the given attempt number (1-based).
    ///
    /// Non-decreasing in `attempt` and never above `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.max(1.0);
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_millis = self.initial_delay.as_millis() as f64 * multiplier.powi(exponent);
        let max_millis = self.max_delay.as_millis() as f64;

        Duration::from_millis(delay_millis.min(max_millis) as u64)
    }

    /// Check if attempt number `attempt` may be made.
    #[must_use]
    pub const fn should_reconnect(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt <= max,
            None => true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
