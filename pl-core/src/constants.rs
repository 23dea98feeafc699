//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "ParcelLive";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed path of the realtime endpoint on the server.
pub const SOCKET_PATH: &str = "/ws";

/// Protocol version sent in the long-poll handshake query.
pub const POLLING_PROTOCOL_VERSION: u32 = 4;

/// Default handshake timeout in milliseconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Default heartbeat ping interval in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Default timeout for a heartbeat pong response in milliseconds.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 10_000;

/// Default bound on the offline send queue.
pub const DEFAULT_SEND_QUEUE_LIMIT: usize = 50;

/// Default base delay for reconnection backoff in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

/// Default cap on the reconnection backoff delay in milliseconds.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default maximum number of automatic reconnection attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Default jitter fraction applied to each backoff delay.
pub const DEFAULT_JITTER_FRACTION: f64 = 0.3;

/// Default rolling window for counting consecutive socket failures, in milliseconds.
pub const DEFAULT_PROBE_WINDOW_MS: u64 = 60_000;

/// Default number of attempts to stay on the fallback transport after escalation.
pub const DEFAULT_FALLBACK_ATTEMPTS: u32 = 3;

/// Default cool-down before retrying the native socket transport, in milliseconds.
pub const DEFAULT_PROBE_COOLDOWN_MS: u64 = 120_000;

/// Grace period for a close acknowledgement during graceful disconnect, in milliseconds.
pub const CLOSE_GRACE_PERIOD_MS: u64 = 2_000;

/// Default auto-hide delay for the connection notification once restored, in milliseconds.
pub const DEFAULT_NOTIFICATION_AUTO_HIDE_MS: u64 = 5_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path() {
        assert!(SOCKET_PATH.starts_with('/'));
    }

    #[test]
    fn test_backoff_defaults_sane() {
        assert!(DEFAULT_BACKOFF_BASE_MS < DEFAULT_BACKOFF_MAX_MS);
        assert!(DEFAULT_JITTER_FRACTION > 0.0 && DEFAULT_JITTER_FRACTION < 1.0);
    }
}
