//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and buffer knobs for the connection coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Delay before tearing down an idle tower binding, in milliseconds
    ///
    /// Keeps the expensive binding alive across brief observer churn.
    #[serde(default = "default_teardown_delay_ms", rename = "teardown-delay-ms")]
    pub teardown_delay_ms: u64,

    /// Period of the telemetry flush while connected, in milliseconds
    #[serde(default = "default_dispatch_period_ms", rename = "dispatch-period-ms")]
    pub dispatch_period_ms: u64,

    /// Capacity hint for distinct event names per flush window
    #[serde(default = "default_event_buffer_capacity", rename = "event-buffer-capacity")]
    pub event_buffer_capacity: usize,

    /// Channel buffer size for coordinator requests
    #[serde(default = "default_channel_buffer", rename = "channel-buffer")]
    pub channel_buffer: usize,
}

fn default_teardown_delay_ms() -> u64 {
    1000
}

fn default_dispatch_period_ms() -> u64 {
    200
}

fn default_event_buffer_capacity() -> usize {
    200
}

fn default_channel_buffer() -> usize {
    256
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            teardown_delay_ms: default_teardown_delay_ms(),
            dispatch_period_ms: default_dispatch_period_ms(),
            event_buffer_capacity: default_event_buffer_capacity(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

impl CoordinatorConfig {
    /// Idle teardown delay as a Duration
    pub fn teardown_delay(&self) -> Duration {
        Duration::from_millis(self.teardown_delay_ms)
    }

    /// Flush period as a Duration
    pub fn dispatch_period(&self) -> Duration {
        Duration::from_millis(self.dispatch_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.teardown_delay_ms, 1000);
        assert_eq!(config.dispatch_period_ms, 200);
        assert_eq!(config.event_buffer_capacity, 200);
        assert_eq!(config.channel_buffer, 256);
    }

    #[test]
    fn test_durations() {
        let config = CoordinatorConfig {
            teardown_delay_ms: 500,
            dispatch_period_ms: 100,
            ..Default::default()
        };
        assert_eq!(config.teardown_delay(), Duration::from_millis(500));
        assert_eq!(config.dispatch_period(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CoordinatorConfig = serde_yaml::from_str("teardown-delay-ms: 2000").unwrap();
        assert_eq!(config.teardown_delay_ms, 2000);
        assert_eq!(config.dispatch_period_ms, 200);
    }
}
