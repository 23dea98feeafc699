//! Shared helpers for integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use pl_core::config::AppConfig;
use pl_core::error::{PlError, PlResult};
use pl_socket::transport::{ConnectTarget, Connector, TransportEvent, TransportHandle};
use pl_socket::{
    ConnectionSession, ConnectionStatus, MessageDispatcher, StatusBroadcaster, TransportKind,
};

/// How a scripted connection attempt behaves.
#[derive(Debug, Clone, Copy)]
pub enum ConnectBehavior {
    /// Resolve successfully right away.
    Succeed,
    /// Fail immediately with a transport error.
    FailFast,
    /// Never resolve; the session's handshake timeout fires.
    Hang,
    /// Resolve successfully after a delay.
    SucceedAfter(Duration),
}

/// Connector driven by a script of behaviors, recording every attempt.
///
/// Successful connections capture transmitted frames into `sent` and keep
/// an inbound event sender in `links` so tests can inject frames and
/// closures.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<ConnectBehavior>>,
    default_behavior: ConnectBehavior,
    /// Transport kind of each attempt, in order.
    pub attempts: Arc<Mutex<Vec<TransportKind>>>,
    /// Frames transmitted over live connections, in order.
    pub sent: Arc<Mutex<Vec<String>>>,
    /// Inbound event senders for live connections, oldest first.
    pub links: Arc<Mutex<Vec<mpsc::Sender<TransportEvent>>>>,
}

impl ScriptedConnector {
    /// Connector that applies `default_behavior` to every attempt.
    pub fn new(default_behavior: ConnectBehavior) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            default_behavior,
            attempts: Arc::new(Mutex::new(Vec::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            links: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Queue behaviors consumed before the default applies.
    pub fn push_script(&self, behaviors: &[ConnectBehavior]) {
        self.script.lock().unwrap().extend(behaviors.iter().copied());
    }

    /// Number of attempts made so far.
    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    /// The inbound event sender of the most recent live connection.
    pub fn latest_link(&self) -> mpsc::Sender<TransportEvent> {
        self.links
            .lock()
            .unwrap()
            .last()
            .expect("no live connection")
            .clone()
    }

    fn make_handle(&self, kind: TransportKind) -> TransportHandle {
        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(64);
        let (close_tx, close_rx) = oneshot::channel::<()>();
        self.links.lock().unwrap().push(event_tx);

        let sent = self.sent.clone();
        let io_task = tokio::spawn(async move {
            tokio::pin!(close_rx);
            loop {
                tokio::select! {
                    frame = out_rx.recv() => match frame {
                        Some(text) => sent.lock().unwrap().push(text),
                        None => return,
                    },
                    _ = &mut close_rx => return,
                }
            }
        });

        TransportHandle::new(kind, out_tx, event_rx, close_tx, io_task)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, target: &ConnectTarget) -> PlResult<TransportHandle> {
        self.attempts.lock().unwrap().push(target.kind);
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_behavior);
        match behavior {
            ConnectBehavior::Succeed => Ok(self.make_handle(target.kind)),
            ConnectBehavior::FailFast => Err(PlError::Transport("scripted failure".into())),
            ConnectBehavior::Hang => std::future::pending().await,
            ConnectBehavior::SucceedAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.make_handle(target.kind))
            }
        }
    }
}

/// Config tuned for fast, deterministic tests.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.server.address = "http://localhost:5000".into();
    config.connection.handshake_timeout_ms = 40;
    config.connection.heartbeat_interval_ms = 10_000;
    config.connection.heartbeat_timeout_ms = 10_000;
    config.connection.send_queue_limit = 20;
    config.connection.reconnect.base_delay_ms = 2;
    config.connection.reconnect.max_delay_ms = 20;
    config.connection.reconnect.max_attempts = 10;
    config.connection.reconnect.jitter_fraction = 0.0;
    config.connection.probe.failure_window_ms = 60_000;
    config.connection.probe.fallback_attempts = 3;
    config.connection.probe.cooldown_ms = 120_000;
    config
}

/// Build a session around a scripted connector.
pub fn create_test_session(
    config: AppConfig,
    connector: Arc<ScriptedConnector>,
) -> ConnectionSession {
    ConnectionSession::with_connector(
        config,
        StatusBroadcaster::new(),
        MessageDispatcher::new(64),
        connector,
    )
}

/// Subscribe a recorder collecting every observed status, in order.
///
/// Returns the shared record; the subscription is leaked into the recorder
/// closure's lifetime by keeping it in the returned guard.
pub fn record_statuses(
    session: &ConnectionSession,
) -> (Arc<Mutex<Vec<ConnectionStatus>>>, pl_socket::Subscription) {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let statuses_clone = statuses.clone();
    let subscription = session.broadcaster().subscribe(move |snapshot| {
        statuses_clone.lock().unwrap().push(snapshot.status);
    });
    (statuses, subscription)
}

/// Poll `condition` until it holds or the timeout elapses.
pub async fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
