//! Transport probing.
//!
//! Decides which transport a connection attempt should use, based on the
//! recorded history of prior attempts. Purely advisory: the session decides
//! whether to act on the suggestion.

use serde::{Deserialize, Serialize};

use pl_core::constants;

/// The transport carrying the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Native WebSocket.
    NativeSocket,
    /// HTTP long-polling fallback.
    LongPoll,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NativeSocket => write!(f, "native-socket"),
            Self::LongPoll => write!(f, "long-poll"),
        }
    }
}

/// Outcome of a single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Handshake completed and the connection went live.
    Connected,
    /// The handshake did not complete within the timeout.
    HandshakeTimeout,
    /// The connection dropped without a clean close.
    AbnormalClose,
    /// The transport failed to open at all (DNS, refused, TLS).
    TransportError,
}

impl AttemptOutcome {
    /// Whether this outcome counts as a failed attempt.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Connected)
    }
}

/// A single entry in the attempt history.
#[derive(Debug, Clone, Copy)]
pub struct AttemptRecord {
    /// The transport that was tried.
    pub transport: TransportKind,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// Epoch milliseconds at which the attempt ended.
    pub at_ms: i64,
}

impl AttemptRecord {
    /// Create a new attempt record.
    pub fn new(transport: TransportKind, outcome: AttemptOutcome, at_ms: i64) -> Self {
        Self { transport, outcome, at_ms }
    }

    fn is_native_failure(&self) -> bool {
        self.transport == TransportKind::NativeSocket && self.outcome.is_failure()
    }
}

/// Pure transport-selection policy.
///
/// Starts with the native socket. Two consecutive native-socket failures
/// within the rolling window escalate to long-poll for the next
/// `fallback_attempts` attempts; after `cooldown_ms` has elapsed since the
/// last native failure, the native socket is probed once more so the
/// session recovers the better transport when the network allows it again.
#[derive(Debug, Clone)]
pub struct TransportProbe {
    /// Rolling window within which consecutive failures count, in milliseconds.
    pub failure_window_ms: u64,
    /// Number of attempts to stay on long-poll after escalation.
    pub fallback_attempts: u32,
    /// Cool-down before retrying the native socket, in milliseconds.
    pub cooldown_ms: u64,
}

impl Default for TransportProbe {
    fn default() -> Self {
        Self {
            failure_window_ms: constants::DEFAULT_PROBE_WINDOW_MS,
            fallback_attempts: constants::DEFAULT_FALLBACK_ATTEMPTS,
            cooldown_ms: constants::DEFAULT_PROBE_COOLDOWN_MS,
        }
    }
}

impl TransportProbe {
    /// Build a probe from configured settings.
    pub fn from_settings(settings: &pl_core::config::ProbeSettings) -> Self {
        Self {
            failure_window_ms: settings.failure_window_ms,
            fallback_attempts: settings.fallback_attempts,
            cooldown_ms: settings.cooldown_ms,
        }
    }

    /// Suggest the transport for the next attempt.
    ///
    /// Pure over the history; the newest record's timestamp serves as the
    /// reference clock so identical histories always produce identical
    /// suggestions.
    pub fn select_transport(&self, history: &[AttemptRecord]) -> TransportKind {
        let Some(last) = history.last() else {
            return TransportKind::NativeSocket;
        };
        let now = last.at_ms;

        // Length of the current fallback run, if any.
        let tail_long_poll = history
            .iter()
            .rev()
            .take_while(|r| r.transport == TransportKind::LongPoll)
            .count() as u32;

        if tail_long_poll > 0 {
            if tail_long_poll < self.fallback_attempts {
                return TransportKind::LongPoll;
            }
            // Fallback run served; retry the native socket once the
            // cool-down since its last failure has elapsed.
            let last_native_failure = history
                .iter()
                .rev()
                .find(|r| r.is_native_failure())
                .map(|r| r.at_ms);
            return match last_native_failure {
                Some(t) if (now - t) < self.cooldown_ms as i64 => TransportKind::LongPoll,
                _ => TransportKind::NativeSocket,
            };
        }

        // Tail is native-socket attempts: escalate on two consecutive
        // failures inside the rolling window.
        if history.len() >= 2 {
            let newest = &history[history.len() - 1];
            let previous = &history[history.len() - 2];
            if newest.is_native_failure()
                && previous.is_native_failure()
                && (newest.at_ms - previous.at_ms) <= self.failure_window_ms as i64
            {
                return TransportKind::LongPoll;
            }
        }

        TransportKind::NativeSocket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> TransportProbe {
        TransportProbe {
            failure_window_ms: 60_000,
            fallback_attempts: 3,
            cooldown_ms: 120_000,
        }
    }

    fn native_fail(at_ms: i64) -> AttemptRecord {
        AttemptRecord::new(
            TransportKind::NativeSocket,
            AttemptOutcome::HandshakeTimeout,
            at_ms,
        )
    }

    fn long_poll_fail(at_ms: i64) -> AttemptRecord {
        AttemptRecord::new(TransportKind::LongPoll, AttemptOutcome::AbnormalClose, at_ms)
    }

    #[test]
    fn test_fresh_history_prefers_native() {
        assert_eq!(probe().select_transport(&[]), TransportKind::NativeSocket);
    }

    #[test]
    fn test_single_failure_stays_native() {
        let history = [native_fail(1_000)];
        assert_eq!(probe().select_transport(&history), TransportKind::NativeSocket);
    }

    #[test]
    fn test_two_consecutive_failures_escalate() {
        let history = [native_fail(1_000), native_fail(5_000)];
        assert_eq!(probe().select_transport(&history), TransportKind::LongPoll);
    }

    #[test]
    fn test_failures_outside_window_do_not_escalate() {
        let history = [native_fail(1_000), native_fail(120_000)];
        assert_eq!(probe().select_transport(&history), TransportKind::NativeSocket);
    }

    #[test]
    fn test_success_between_failures_blocks_escalation() {
        let history = [
            native_fail(1_000),
            AttemptRecord::new(TransportKind::NativeSocket, AttemptOutcome::Connected, 2_000),
            native_fail(3_000),
        ];
        assert_eq!(probe().select_transport(&history), TransportKind::NativeSocket);
    }

    #[test]
    fn test_fallback_run_continues_for_configured_attempts() {
        let mut history = vec![native_fail(1_000), native_fail(2_000)];
        // Escalated; the next two fallback attempts stay on long-poll.
        history.push(long_poll_fail(3_000));
        assert_eq!(probe().select_transport(&history), TransportKind::LongPoll);
        history.push(long_poll_fail(4_000));
        assert_eq!(probe().select_transport(&history), TransportKind::LongPoll);
    }

    #[test]
    fn test_native_retry_after_cooldown() {
        let mut history = vec![native_fail(1_000), native_fail(2_000)];
        for i in 0..3 {
            history.push(long_poll_fail(3_000 + i));
        }
        // Fallback run complete but the cool-down since the native failure
        // at t=2s has not elapsed yet.
        assert_eq!(probe().select_transport(&history), TransportKind::LongPoll);

        // Push the clock past the cool-down via a newer long-poll record.
        history.push(long_poll_fail(2_000 + 120_000));
        assert_eq!(probe().select_transport(&history), TransportKind::NativeSocket);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let history = [native_fail(1_000), native_fail(2_000)];
        let p = probe();
        assert_eq!(p.select_transport(&history), p.select_transport(&history));
    }
}
