//! Reconnection backoff policy.
//!
//! Computes the delay before each reconnection attempt: exponential backoff
//! with jitter, capped at a maximum, with a give-up condition once the
//! attempt count exceeds the configured limit. Kept free of I/O so the
//! schedule is testable, and seedable so jitter is reproducible.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pl_core::config::ReconnectSettings;

/// Backoff schedule for reconnection attempts.
///
/// Sequence (with 1s base, 30s cap): ~1s, ~2s, ~4s, ~8s, ~16s, then capped.
/// Jitter of +/- `jitter_fraction` is applied to each delay to prevent
/// thundering herd, and the result never exceeds the cap.
#[derive(Debug)]
pub struct ReconnectPolicy {
    /// Base delay between reconnection attempts.
    base_delay: Duration,
    /// Maximum delay cap for exponential backoff.
    max_delay: Duration,
    /// Maximum number of attempts before giving up (0 = unlimited).
    max_attempts: u32,
    /// Jitter fraction (0.0 to 1.0) applied to each delay.
    jitter_fraction: f64,
    rng: StdRng,
}

impl ReconnectPolicy {
    /// Build a policy from configured settings with an entropy-seeded RNG.
    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self::with_seed(settings, rand::random())
    }

    /// Build a policy with a fixed RNG seed, for reproducible schedules.
    pub fn with_seed(settings: &ReconnectSettings, seed: u64) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_attempts: settings.max_attempts,
            jitter_fraction: settings.jitter_fraction,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Maximum number of attempts before giving up (0 = unlimited).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Compute the delay before attempt number `attempt` (0-based).
    ///
    /// Returns `None` once `attempt` reaches the configured maximum,
    /// signalling the session to stop retrying and surface a terminal
    /// error state.
    pub fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if self.max_attempts > 0 && attempt >= self.max_attempts {
            return None;
        }

        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();

        // Exponential backoff: base * 2^attempt, capped.
        let exponential = (base * 2.0_f64.powi(attempt.min(31) as i32)).min(max);

        // Jitter: +/- jitter_fraction * delay, never exceeding the cap.
        let jitter_range = exponential * self.jitter_fraction;
        let jitter = (self.rng.gen::<f64>() * 2.0 - 1.0) * jitter_range;
        let delay = (exponential + jitter).min(max).max(0.0);

        Some(Duration::from_secs_f64(delay))
    }
}
