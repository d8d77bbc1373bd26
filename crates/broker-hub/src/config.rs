//! Hub configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// WebSocket hub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Idle time after which a silent client is dropped.
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,
    /// Upper bound on a single write to a client.
    #[serde(default = "default_write_wait_secs")]
    pub write_wait_secs: u64,
    /// Largest accepted inbound message.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Maximum concurrent WebSocket connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_pong_wait_secs() -> u64 {
    60
}

fn default_write_wait_secs() -> u64 {
    10
}

fn default_max_message_bytes() -> usize {
    512
}

fn default_max_connections() -> usize {
    1_000
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            pong_wait_secs: default_pong_wait_secs(),
            write_wait_secs: default_write_wait_secs(),
            max_message_bytes: default_max_message_bytes(),
            max_connections: default_max_connections(),
        }
    }
}

impl HubConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Ping period: 90% of the idle timeout.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = HubConfig::default();
        assert_eq!(config.pong_wait(), Duration::from_secs(60));
        assert_eq!(config.ping_period(), Duration::from_secs(54));
        assert_eq!(config.write_wait(), Duration::from_secs(10));
        assert_eq!(config.max_message_bytes, 512);
    }
}
