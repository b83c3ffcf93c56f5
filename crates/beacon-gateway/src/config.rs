//! Per-endpoint configuration.

use std::time::Duration;

use beacon_proto::ServerId;

use crate::reconnect::ReconnectConfig;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between heartbeat probes.
    pub interval: Duration,
    /// Deadline for each probe's acknowledgement.
    pub ack_timeout: Duration,
    /// Consecutive unanswered probes before the connection is considered dead.
    pub max_missed_acks: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            ack_timeout: Duration::from_secs(10),
            max_missed_acks: 3,
        }
    }
}

/// Everything the gateway needs to talk to one beacon.
///
/// Supplied as plain data by the administrative configuration store; the
/// gateway never persists it. `server_id` keys the channel in the pool.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Opaque key identifying the logical endpoint.
    pub server_id: ServerId,
    /// WebSocket URL of the beacon (`ws://host:port` or `wss://host:port`).
    pub url: String,
    /// Shared secret carried in every request frame.
    pub auth_key: String,
    /// Deadline applied to calls that do not specify their own.
    pub default_timeout: Duration,
    /// Reconnect backoff policy.
    pub reconnect: ReconnectConfig,
    /// Heartbeat policy.
    pub heartbeat: HeartbeatConfig,
}

impl EndpointConfig {
    /// Create a configuration with default timeout, reconnect, and
    /// heartbeat policies.
    #[must_use]
    pub fn new(server_id: ServerId, url: impl Into<String>, auth_key: impl Into<String>) -> Self {
        Self {
            server_id,
            url: url.into(),
            auth_key: auth_key.into(),
            default_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Set the default per-call timeout.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Limit consecutive failed connect attempts before the channel gives up.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.reconnect.max_attempts = Some(max_retries);
        self
    }

    /// Replace the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Replace the heartbeat policy.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_id() -> ServerId {
        ServerId::new("srv-1").unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = EndpointConfig::new(server_id(), "ws://127.0.0.1:7777", "secret");

        assert_eq!(config.url, "ws://127.0.0.1:7777");
        assert_eq!(config.auth_key, "secret");
        assert_eq!(config.default_timeout, Duration::from_secs(10));
        assert!(config.reconnect.max_attempts.is_none());
        assert_eq!(config.heartbeat.max_missed_acks, 3);
    }

    #[test]
    fn test_config_builders() {
        let config = EndpointConfig::new(server_id(), "ws://beacon:7777", "secret")
            .with_default_timeout(Duration::from_secs(3))
            .with_max_retries(8)
            .with_heartbeat(HeartbeatConfig {
                interval: Duration::from_secs(5),
                ack_timeout: Duration::from_secs(2),
                max_missed_acks: 2,
            });

        assert_eq!(config.default_timeout, Duration::from_secs(3));
        assert_eq!(config.reconnect.max_attempts, Some(8));
        assert_eq!(config.heartbeat.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_heartbeat_config_default() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.ack_timeout, Duration::from_secs(10));
        assert_eq!(config.max_missed_acks, 3);
    }
}
