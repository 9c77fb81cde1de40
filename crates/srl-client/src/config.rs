// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session tuning knobs.

use std::time::Duration;

/// Timing and retry configuration of a client session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Budget for resolve + connect + handshake, end to end.
    pub handshake_timeout: Duration,
    /// Application-level ping cadence while connected.
    pub ping_interval: Duration,
    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Reconnect attempts before the session gives up.
    pub max_reconnect_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            ping_interval: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.handshake_timeout, Duration::from_secs(30));
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.max_reconnect_attempts, 5);
    }
}
