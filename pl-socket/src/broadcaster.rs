//! Observable connection state.
//!
//! The `StatusBroadcaster` holds the current connection status, transport,
//! and metrics, and fans out every change to registered subscribers. It is
//! an explicitly constructed, injected object: the session writes to it,
//! any number of UI consumers read from it, and nobody else owns the
//! underlying connection.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::probe::TransportKind;

/// Connection status as observed by subscribers.
///
/// Transitions happen only inside the connection session; consumers never
/// set this directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Not connected and not trying to connect.
    Disconnected,
    /// Attempting to establish a connection.
    Connecting,
    /// Connected and exchanging messages.
    Connected,
    /// Connection lost, attempting to reconnect.
    Reconnecting,
    /// Gave up after exhausting retries; only a manual reconnect resumes.
    Errored,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Connection health metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionMetrics {
    /// Number of transitions into `Reconnecting` over the session's life.
    /// Monotonic; reset only when a fresh session is created.
    pub reconnect_count: u64,
    /// When the connection last completed a handshake.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Human-readable summary of the most recent failure.
    pub last_error: Option<String>,
    /// Rolling latency estimate from heartbeat round trips, in milliseconds.
    pub latency_ms: Option<u64>,
}

impl ConnectionMetrics {
    /// Fold a heartbeat round-trip sample into the rolling estimate.
    ///
    /// Exponentially weighted moving average, 1/8 sample weight.
    pub fn record_latency(&mut self, sample_ms: u64) {
        self.latency_ms = Some(match self.latency_ms {
            None => sample_ms,
            Some(previous) => (previous * 7 + sample_ms) / 8,
        });
    }
}

/// Immutable view of the connection state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// Current connection status.
    pub status: ConnectionStatus,
    /// Transport carrying (or about to carry) the connection.
    pub transport: TransportKind,
    /// Connection health metrics.
    pub metrics: ConnectionMetrics,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            transport: TransportKind::NativeSocket,
            metrics: ConnectionMetrics::default(),
        }
    }
}

type Callback = Arc<dyn Fn(&StatusSnapshot) + Send + Sync>;

struct Registry {
    snapshot: StatusSnapshot,
    subscribers: Vec<(u64, Callback)>,
    next_id: u64,
}

/// Observable connection state with synchronous subscriber callbacks and a
/// watch-channel mirror for async consumers.
///
/// Cloning shares the same underlying state.
#[derive(Clone)]
pub struct StatusBroadcaster {
    registry: Arc<Mutex<Registry>>,
    watch_tx: Arc<watch::Sender<StatusSnapshot>>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBroadcaster {
    /// Create a broadcaster in the initial (disconnected) state.
    pub fn new() -> Self {
        let snapshot = StatusSnapshot::default();
        let (watch_tx, _) = watch::channel(snapshot.clone());
        Self {
            registry: Arc::new(Mutex::new(Registry {
                snapshot,
                subscribers: Vec::new(),
                next_id: 0,
            })),
            watch_tx: Arc::new(watch_tx),
        }
    }

    /// Get the current snapshot. Side-effect free.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().snapshot.clone()
    }

    /// Register a callback invoked synchronously on every state change.
    ///
    /// The returned subscription unsubscribes explicitly; unsubscribing is
    /// idempotent and safe to call from inside a callback.
    pub fn subscribe(
        &self,
        callback: impl Fn(&StatusSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push((id, Arc::new(callback)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Subscribe to snapshot changes via a watch channel.
    ///
    /// Mirrors the callback broadcasts; convenient for async select loops.
    pub fn watch_receiver(&self) -> watch::Receiver<StatusSnapshot> {
        self.watch_tx.subscribe()
    }

    /// Current number of callback subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Apply a mutation to the snapshot, broadcasting only if it changed.
    ///
    /// The subscriber list is snapshotted before invocation, so a callback
    /// that unsubscribes (itself or another) cannot disturb the cycle in
    /// flight, and each session event produces at most one cycle.
    pub(crate) fn apply(&self, mutate: impl FnOnce(&mut StatusSnapshot)) {
        let (snapshot, callbacks) = {
            let mut registry = self.lock();
            let mut next = registry.snapshot.clone();
            mutate(&mut next);
            if next == registry.snapshot {
                return;
            }
            registry.snapshot = next.clone();
            let callbacks: Vec<Callback> =
                registry.subscribers.iter().map(|(_, cb)| cb.clone()).collect();
            (next, callbacks)
        };

        debug!(
            "status broadcast: {} via {} ({} subscriber(s))",
            snapshot.status,
            snapshot.transport,
            callbacks.len()
        );
        let _ = self.watch_tx.send(snapshot.clone());
        for callback in callbacks {
            callback(&snapshot);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle for removing a subscriber from the broadcaster.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the subscriber. Idempotent; a second call is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}
