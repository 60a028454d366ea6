//! Centralized configuration for the scene bridge.
//!
//! Wire limits and transport defaults live in const blocks; the per-component
//! tunables (`ServerConfig`, `ClientConfig`, `MainLoopConfig`) are plain
//! structs with `Default` impls so embedders can override individual fields.

use std::time::Duration;

use crate::transport::Endpoint;

/// Hard limits on the wire format.
pub struct WireConfig;

impl WireConfig {
    /// Largest accepted payload. Render results can carry base64 image data,
    /// so this is deliberately generous for a local socket.
    pub const MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024; // 16MB

    /// Upper bound on ASCII digits in a length header. Ten digits already
    /// exceeds any length [`MAX_PAYLOAD_BYTES`](Self::MAX_PAYLOAD_BYTES)
    /// permits, so a longer run of digits is garbage, not a big message.
    pub const MAX_LENGTH_DIGITS: usize = 10;
}

/// Default endpoint locations.
pub struct TransportDefaults;

impl TransportDefaults {
    /// Socket file created under the OS temp directory on Unix.
    pub const SOCKET_FILE_NAME: &'static str = "scene-bridge.sock";
    /// Loopback TCP port used where Unix domain sockets are unavailable.
    pub const TCP_PORT: u16 = 27015;
}

/// Tunables for the listening side of the bridge.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Where to listen. Defaults to the platform-appropriate local endpoint.
    pub endpoint: Endpoint,
    /// Concurrent connections accepted before new ones are turned away.
    pub max_connections: usize,
    /// How long a single request may wait on the host main loop before the
    /// caller receives a timeout envelope.
    pub call_timeout: Duration,
}

impl ServerConfig {
    pub const DEFAULT_MAX_CONNECTIONS: usize = 4;
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default_for_platform(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Tunables for the connecting side of the bridge.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection attempts before giving up. The host side often starts a
    /// beat later than the controller, so the first attempts may find nobody
    /// listening yet.
    pub connect_attempts: u32,
    /// Delay after the first failed attempt; doubles per attempt.
    pub initial_backoff: Duration,
    /// Ceiling for the per-attempt backoff delay.
    pub max_backoff: Duration,
    /// Limit on a single connection attempt.
    pub connect_timeout: Duration,
    /// Limit on one full request/response exchange.
    pub io_timeout: Duration,
}

impl ClientConfig {
    pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;
    pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(200);
    pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(2);
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_attempts: Self::DEFAULT_CONNECT_ATTEMPTS,
            initial_backoff: Self::DEFAULT_INITIAL_BACKOFF,
            max_backoff: Self::DEFAULT_MAX_BACKOFF,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            io_timeout: Self::DEFAULT_IO_TIMEOUT,
        }
    }
}

/// Tunables for main-loop task scheduling.
#[derive(Debug, Clone)]
pub struct MainLoopConfig {
    /// Tasks allowed to queue before new submissions are rejected.
    pub max_queue_depth: usize,
    /// Suggested tick delay while work is flowing.
    pub busy_poll_interval: Duration,
    /// Suggested tick delay when the queue has gone quiet.
    pub idle_poll_interval: Duration,
}

impl MainLoopConfig {
    pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 64;
    pub const DEFAULT_BUSY_POLL_INTERVAL: Duration = Duration::from_millis(100);
    pub const DEFAULT_IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);
}

impl Default for MainLoopConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: Self::DEFAULT_MAX_QUEUE_DEPTH,
            busy_poll_interval: Self::DEFAULT_BUSY_POLL_INTERVAL,
            idle_poll_interval: Self::DEFAULT_IDLE_POLL_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_limits_are_consistent() {
        // Every permitted payload length must fit in the digit budget.
        let digits = WireConfig::MAX_PAYLOAD_BYTES.to_string().len();
        assert!(digits <= WireConfig::MAX_LENGTH_DIGITS);
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(ServerConfig::DEFAULT_CALL_TIMEOUT > Duration::ZERO);
        assert!(ClientConfig::DEFAULT_INITIAL_BACKOFF < ClientConfig::DEFAULT_MAX_BACKOFF);
        let defaults = MainLoopConfig::default();
        assert!(defaults.busy_poll_interval < defaults.idle_poll_interval);
    }
}
