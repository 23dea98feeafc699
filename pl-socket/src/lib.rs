//! ParcelLive Socket - realtime connection layer.
//!
//! This crate provides the client-side connection manager that keeps a live
//! collaboration/notification channel open against an unreliable network:
//! - Connection session state machine with handshake timeouts and heartbeats
//! - Automatic reconnection with exponential backoff and jitter
//! - Transport probing with long-poll fallback and native-socket recovery
//! - Observable status, transport, and metrics for any number of consumers
//! - Message envelope codec and broadcast-based dispatch

pub mod backoff;
pub mod broadcaster;
pub mod envelope;
pub mod probe;
pub mod session;
pub mod transport;

// Re-export key types
pub use backoff::ReconnectPolicy;
pub use broadcaster::{
    ConnectionMetrics, ConnectionStatus, StatusBroadcaster, StatusSnapshot, Subscription,
};
pub use envelope::{Envelope, MessageDispatcher, MessageType};
pub use probe::{AttemptOutcome, AttemptRecord, TransportKind, TransportProbe};
pub use session::ConnectionSession;
pub use transport::{ConnectTarget, Connector, TransportEvent, TransportHandle};
