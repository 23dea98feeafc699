//! Connection session state machine.
//!
//! Owns one logical connection to the realtime endpoint: opens it via the
//! transport suggested by the probe, tracks liveness with heartbeats,
//! drives the reconnection policy on failure, and publishes every state
//! change through the status broadcaster. Inbound collaboration messages
//! fan out through the message dispatcher.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pl_core::config::AppConfig;
use pl_core::error::{PlError, PlResult};

use crate::backoff::ReconnectPolicy;
use crate::broadcaster::{ConnectionStatus, StatusBroadcaster, StatusSnapshot};
use crate::envelope::{now_ms, Envelope, MessageDispatcher, MessageType};
use crate::probe::{AttemptOutcome, AttemptRecord, TransportKind, TransportProbe};
use crate::transport::{
    ConnectTarget, Connector, DefaultConnector, TransportEvent, TransportHandle,
};

/// How many attempt records the probe history retains.
const ATTEMPT_HISTORY_LIMIT: usize = 32;

/// The connection session.
///
/// Created once at application start and shared by cloning; all clones
/// drive the same underlying connection. The session is the only writer of
/// connection status, and the only owner of the transport handle.
#[derive(Clone)]
pub struct ConnectionSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: AppConfig,
    connector: Arc<dyn Connector>,
    broadcaster: StatusBroadcaster,
    dispatcher: MessageDispatcher,
    /// Backoff schedule for the current retry run.
    policy: Mutex<ReconnectPolicy>,
    /// Transport selection policy, fed from `history`.
    probe: TransportProbe,
    /// Consecutive failures in the current retry run.
    attempt: Mutex<u32>,
    /// Recent attempt records for the probe.
    history: Mutex<Vec<AttemptRecord>>,
    /// Attempt epoch. Bumped on disconnect, manual reconnect, and
    /// connection loss; every async completion compares its epoch before
    /// acting, so cancelled work is discarded rather than processed.
    generation: AtomicU64,
    /// The single live transport handle.
    handle: Mutex<Option<TransportHandle>>,
    /// The single outstanding reconnection timer.
    retry_timer: Mutex<Option<JoinHandle<()>>>,
    /// Task draining transport events for the live connection.
    driver_task: Mutex<Option<JoinHandle<()>>>,
    /// Heartbeat task for the live connection.
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    /// Messages accepted while not connected, oldest first.
    send_queue: Mutex<VecDeque<Envelope>>,
    /// When the outstanding heartbeat ping was sent, if any.
    awaiting_pong: Mutex<Option<Instant>>,
}

impl ConnectionSession {
    /// Create a session with the production connectors.
    pub fn new(
        config: AppConfig,
        broadcaster: StatusBroadcaster,
        dispatcher: MessageDispatcher,
    ) -> PlResult<Self> {
        let connector = Arc::new(DefaultConnector::new(config.server.accept_self_signed_certs)?);
        Ok(Self::with_connector(config, broadcaster, dispatcher, connector))
    }

    /// Create a session with an injected connector (custom transports, tests).
    pub fn with_connector(
        config: AppConfig,
        broadcaster: StatusBroadcaster,
        dispatcher: MessageDispatcher,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let policy = ReconnectPolicy::from_settings(&config.connection.reconnect);
        let probe = TransportProbe::from_settings(&config.connection.probe);
        Self {
            inner: Arc::new(SessionInner {
                config,
                connector,
                broadcaster,
                dispatcher,
                policy: Mutex::new(policy),
                probe,
                attempt: Mutex::new(0),
                history: Mutex::new(Vec::new()),
                generation: AtomicU64::new(0),
                handle: Mutex::new(None),
                retry_timer: Mutex::new(None),
                driver_task: Mutex::new(None),
                heartbeat_task: Mutex::new(None),
                send_queue: Mutex::new(VecDeque::new()),
                awaiting_pong: Mutex::new(None),
            }),
        }
    }

    /// The broadcaster publishing this session's state.
    pub fn broadcaster(&self) -> &StatusBroadcaster {
        &self.inner.broadcaster
    }

    /// The dispatcher fanning out inbound collaboration messages.
    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.inner.dispatcher
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.broadcaster.snapshot().status
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.broadcaster.snapshot()
    }

    /// Start the connection.
    ///
    /// No-op when already connecting or connected. The returned future
    /// resolves once the first attempt settles; later retries run on
    /// internal timers and surface only as status changes.
    pub async fn connect(&self) -> PlResult<()> {
        let status = self.status();
        if matches!(status, ConnectionStatus::Connecting | ConnectionStatus::Connected) {
            debug!("already {status}, skipping connect");
            return Ok(());
        }

        *self.inner.attempt.lock().await = 0;
        let generation = self.inner.bump_generation();
        self.inner.clone().start_attempt(generation).await;
        Ok(())
    }

    /// Close the connection and stop all retries. Always succeeds.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        // Invalidate in-flight handshakes and armed timers first, so a
        // handshake success landing after this point is discarded.
        inner.bump_generation();
        inner.clear_retry_timer().await;
        inner.abort_connection_tasks().await;

        let handle = inner.handle.lock().await.take();
        if let Some(handle) = handle {
            handle.close().await;
        }
        *inner.awaiting_pong.lock().await = None;

        inner.broadcaster.apply(|s| s.status = ConnectionStatus::Disconnected);
        info!("disconnected");
    }

    /// Send a message over the channel.
    ///
    /// Queues while not yet connected (bounded, oldest dropped on
    /// overflow); drops with a logged warning while errored. Never fails
    /// from the caller's perspective.
    pub async fn send(&self, envelope: Envelope) {
        match self.status() {
            ConnectionStatus::Connected => self.inner.transmit(envelope).await,
            ConnectionStatus::Errored => {
                warn!(
                    "dropping {} message: session errored",
                    envelope.message_type.as_str()
                );
            }
            _ => {
                let limit = self.inner.config.connection.send_queue_limit;
                let mut queue = self.inner.send_queue.lock().await;
                if queue.len() >= limit {
                    queue.pop_front();
                    warn!("send queue full ({limit}), dropping oldest message");
                }
                queue.push_back(envelope);
            }
        }
    }

    /// Force an immediate retry, bypassing any backoff wait.
    ///
    /// From `Errored` this re-enters `Connecting` with a fresh attempt
    /// counter so automatic retries resume. Does not add to the
    /// `reconnect_count` accounting by itself.
    pub async fn reconnect(&self) {
        info!("manual reconnect requested");
        let inner = &self.inner;
        let generation = inner.bump_generation();
        inner.clear_retry_timer().await;
        inner.abort_connection_tasks().await;
        let handle = inner.handle.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
        }
        *inner.awaiting_pong.lock().await = None;
        *inner.attempt.lock().await = 0;
        inner.clone().start_attempt(generation).await;
    }
}

impl SessionInner {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Advance the epoch only if it still equals `from`. Exactly one of
    /// several racing failure reporters wins.
    fn try_advance_generation(&self, from: u64) -> Option<u64> {
        self.generation
            .compare_exchange(from, from + 1, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|g| g + 1)
    }

    async fn clear_retry_timer(&self) {
        if let Some(timer) = self.retry_timer.lock().await.take() {
            timer.abort();
        }
    }

    async fn abort_connection_tasks(&self) {
        if let Some(task) = self.driver_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.heartbeat_task.lock().await.take() {
            task.abort();
        }
    }

    async fn push_history(&self, transport: TransportKind, outcome: AttemptOutcome) {
        let mut history = self.history.lock().await;
        history.push(AttemptRecord::new(transport, outcome, now_ms()));
        if history.len() > ATTEMPT_HISTORY_LIMIT {
            history.remove(0);
        }
    }

    /// Run one connection attempt for the given epoch.
    async fn start_attempt(self: Arc<Self>, generation: u64) {
        if self.generation() != generation {
            return;
        }

        let transport = {
            let history = self.history.lock().await;
            self.probe.select_transport(&history)
        };
        self.broadcaster.apply(|s| {
            s.status = ConnectionStatus::Connecting;
            s.transport = transport;
        });

        let target = match ConnectTarget::from_config(&self.config, transport) {
            Ok(target) => target,
            Err(e) => {
                error!("cannot derive connection target: {e}");
                self.push_history(transport, AttemptOutcome::TransportError).await;
                self.schedule_retry_boxed(e.to_string(), generation).await;
                return;
            }
        };
        info!("connecting via {transport} to {}", target.url);

        let timeout = self.config.connection.handshake_timeout();
        let result = tokio::time::timeout(timeout, self.connector.connect(&target)).await;

        // A disconnect or newer attempt invalidated this one while the
        // handshake was in flight: discard whatever it produced.
        if self.generation() != generation {
            if let Ok(Ok(handle)) = result {
                debug!("discarding handshake that completed after cancellation");
                handle.abort();
            }
            return;
        }

        match result {
            Ok(Ok(handle)) => self.on_handshake_success(handle, generation).await,
            Ok(Err(e)) => {
                warn!("handshake failed via {transport}: {e}");
                self.push_history(transport, AttemptOutcome::TransportError).await;
                self.schedule_retry_boxed(e.to_string(), generation).await;
            }
            Err(_) => {
                let e = PlError::HandshakeTimeout(self.config.connection.handshake_timeout_ms);
                warn!("{e} via {transport}");
                self.push_history(transport, AttemptOutcome::HandshakeTimeout).await;
                self.schedule_retry_boxed(e.to_string(), generation).await;
            }
        }
    }

    async fn on_handshake_success(
        self: &Arc<Self>,
        mut handle: TransportHandle,
        generation: u64,
    ) {
        let transport = handle.kind();
        let events = handle.take_events();
        self.push_history(transport, AttemptOutcome::Connected).await;

        {
            let mut slot = self.handle.lock().await;
            // Exclusive ownership: any stale handle must be gone before a
            // new one goes live.
            if let Some(previous) = slot.take() {
                previous.abort();
            }
            *slot = Some(handle);
        }

        self.broadcaster.apply(|s| {
            s.status = ConnectionStatus::Connected;
            s.transport = transport;
            s.metrics.last_connected_at = Some(Utc::now());
            s.metrics.last_error = None;
        });
        info!("connected via {transport}");

        if self.config.server.user_id != 0 {
            let auth = Envelope::auth(self.config.server.user_id, &self.config.server.user_name);
            self.transmit(auth).await;
        }

        let queued: Vec<Envelope> = {
            let mut queue = self.send_queue.lock().await;
            queue.drain(..).collect()
        };
        if !queued.is_empty() {
            info!("flushing {} queued message(s)", queued.len());
            for envelope in queued {
                self.transmit(envelope).await;
            }
        }

        *self.attempt.lock().await = 0;
        *self.awaiting_pong.lock().await = None;

        if let Some(events) = events {
            let driver = tokio::spawn(self.clone().drive_events(events, transport, generation));
            let mut slot = self.driver_task.lock().await;
            if let Some(previous) = slot.take() {
                previous.abort();
            }
            *slot = Some(driver);
        }

        let heartbeat = tokio::spawn(self.clone().heartbeat_loop(transport, generation));
        let mut slot = self.heartbeat_task.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(heartbeat);
    }

    /// Serialize and hand a message to the live transport.
    async fn transmit(&self, envelope: Envelope) {
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("failed to encode outbound message: {e}");
                return;
            }
        };
        let handle = self.handle.lock().await;
        match handle.as_ref() {
            Some(handle) => {
                if let Err(e) = handle.send(text).await {
                    warn!("transmit failed: {e}");
                }
            }
            None => warn!("transmit with no live transport, dropping message"),
        }
    }

    /// Drain transport events for one live connection.
    async fn drive_events(
        self: Arc<Self>,
        mut events: mpsc::Receiver<TransportEvent>,
        transport: TransportKind,
        generation: u64,
    ) {
        while let Some(event) = events.recv().await {
            if self.generation() != generation {
                return;
            }
            match event {
                TransportEvent::Message(text) => self.on_frame(&text).await,
                TransportEvent::Closed { reason, clean } => {
                    if clean {
                        debug!("transport closed cleanly: {reason}");
                        return;
                    }
                    warn!("connection lost: {reason}");
                    self.on_connection_lost(transport, AttemptOutcome::AbnormalClose, reason, generation);
                    return;
                }
            }
        }
    }

    /// Handle one inbound text frame.
    async fn on_frame(&self, text: &str) {
        let envelope = match Envelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("dropping malformed message: {e}");
                return;
            }
        };
        match &envelope.message_type {
            MessageType::Ping => self.transmit(Envelope::pong()).await,
            MessageType::Pong => self.on_pong().await,
            MessageType::Unknown(kind) => {
                warn!("dropping message with unknown type: {kind}");
            }
            _ => self.dispatcher.dispatch(envelope),
        }
    }

    async fn on_pong(&self) {
        let sent = self.awaiting_pong.lock().await.take();
        if let Some(sent) = sent {
            let latency_ms = sent.elapsed().as_millis() as u64;
            debug!("heartbeat pong after {latency_ms}ms");
            self.broadcaster.apply(|s| s.metrics.record_latency(latency_ms));
        }
    }

    /// Periodic liveness probe for one live connection.
    async fn heartbeat_loop(self: Arc<Self>, transport: TransportKind, generation: u64) {
        let interval = self.config.connection.heartbeat_interval();
        let timeout = self.config.connection.heartbeat_timeout();
        loop {
            tokio::time::sleep(interval).await;
            if self.generation() != generation {
                return;
            }
            *self.awaiting_pong.lock().await = Some(Instant::now());
            self.transmit(Envelope::ping()).await;

            tokio::time::sleep(timeout).await;
            if self.generation() != generation {
                return;
            }
            if self.awaiting_pong.lock().await.is_some() {
                warn!(
                    "heartbeat pong missed after {}ms",
                    self.config.connection.heartbeat_timeout_ms
                );
                self.on_connection_lost(
                    transport,
                    AttemptOutcome::AbnormalClose,
                    "heartbeat pong missed".into(),
                    generation,
                );
                return;
            }
        }
    }

    /// React to a dead connection: tear down and enter the retry path.
    ///
    /// Runs the recovery on a fresh task because the reporters (driver,
    /// heartbeat) are themselves torn down along the way. The epoch CAS
    /// ensures exactly one racing reporter recovers.
    fn on_connection_lost(
        self: &Arc<Self>,
        transport: TransportKind,
        outcome: AttemptOutcome,
        reason: String,
        generation: u64,
    ) {
        let this = self.clone();
        tokio::spawn(async move {
            let Some(new_generation) = this.try_advance_generation(generation) else {
                return;
            };
            this.clear_retry_timer().await;
            this.abort_connection_tasks().await;
            let handle = this.handle.lock().await.take();
            if let Some(handle) = handle {
                handle.abort();
            }
            *this.awaiting_pong.lock().await = None;
            this.push_history(transport, outcome).await;
            this.schedule_retry(reason, new_generation).await;
        });
    }

    /// Boxed wrapper around [`schedule_retry`]. Type-erasing the future here
    /// breaks the mutually-recursive `Send` inference cycle between
    /// `start_attempt` (which awaits `schedule_retry`) and `schedule_retry`
    /// (whose retry timer awaits `start_attempt`).
    fn schedule_retry_boxed(
        self: &Arc<Self>,
        reason: String,
        generation: u64,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        let this = self.clone();
        Box::pin(async move { this.schedule_retry(reason, generation).await })
    }

    /// Account for a failed attempt and arm (at most) one retry timer.
    async fn schedule_retry(self: &Arc<Self>, reason: String, generation: u64) {
        if self.generation() != generation {
            return;
        }

        let attempt = {
            let mut attempt = self.attempt.lock().await;
            *attempt += 1;
            *attempt
        };

        self.broadcaster.apply(|s| {
            s.status = ConnectionStatus::Reconnecting;
            s.metrics.reconnect_count += 1;
            s.metrics.last_error = Some(reason.clone());
        });

        let delay = {
            let mut policy = self.policy.lock().await;
            policy.next_delay(attempt - 1)
        };
        let Some(delay) = delay else {
            error!("giving up after {attempt} attempts: {reason}");
            self.broadcaster.apply(|s| {
                s.status = ConnectionStatus::Errored;
                s.metrics.last_error = Some(
                    PlError::RetriesExhausted {
                        attempts: attempt,
                        last_error: reason.clone(),
                    }
                    .to_string(),
                );
            });
            self.clear_retry_timer().await;
            return;
        };

        warn!(
            "reconnection attempt {attempt} in {:.1}s",
            delay.as_secs_f64()
        );
        let this = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The timer consumed itself; empty the slot without aborting so
            // the next arm never cancels the attempt it is part of.
            this.retry_timer.lock().await.take();
            if this.generation() == generation {
                this.clone().start_attempt(generation).await;
            }
        });
        // Cancel-before-arm: the slot never holds two timers.
        let mut slot = self.retry_timer.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::oneshot;

    /// Connector whose connections always succeed; transmitted frames are
    /// captured for inspection.
    struct CaptureConnector {
        sent: Arc<StdMutex<Vec<String>>>,
    }

    impl CaptureConnector {
        fn new() -> (Self, Arc<StdMutex<Vec<String>>>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            (Self { sent: sent.clone() }, sent)
        }
    }

    #[async_trait]
    impl Connector for CaptureConnector {
        async fn connect(&self, target: &ConnectTarget) -> PlResult<TransportHandle> {
            let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
            let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(64);
            let (close_tx, close_rx) = oneshot::channel::<()>();
            let sent = self.sent.clone();
            let io_task = tokio::spawn(async move {
                let _keep_events_open = event_tx;
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
            Ok(TransportHandle::new(target.kind, out_tx, event_rx, close_tx, io_task))
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.server.address = "http://localhost:5000".into();
        config.connection.handshake_timeout_ms = 200;
        config.connection.send_queue_limit = 5;
        config.connection.reconnect.base_delay_ms = 5;
        config.connection.reconnect.max_delay_ms = 20;
        config.connection.reconnect.jitter_fraction = 0.0;
        config
    }

    fn session_with_capture(config: AppConfig) -> (ConnectionSession, Arc<StdMutex<Vec<String>>>) {
        let (connector, sent) = CaptureConnector::new();
        let session = ConnectionSession::with_connector(
            config,
            StatusBroadcaster::new(),
            MessageDispatcher::new(16),
            Arc::new(connector),
        );
        (session, sent)
    }

    #[tokio::test]
    async fn test_connect_happy_path_status_sequence() {
        let (session, _sent) = session_with_capture(test_config());
        let observed = Arc::new(StdMutex::new(Vec::new()));
        let observed_clone = observed.clone();
        let _sub = session.broadcaster().subscribe(move |snap| {
            observed_clone.lock().unwrap().push(snap.status);
        });

        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        session.connect().await.unwrap();

        assert_eq!(session.status(), ConnectionStatus::Connected);
        assert_eq!(
            observed.lock().unwrap().clone(),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
        assert_eq!(session.snapshot().metrics.reconnect_count, 0);
        assert!(session.snapshot().metrics.last_connected_at.is_some());

        session.disconnect().await;
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_is_noop_when_connected() {
        let (session, _sent) = session_with_capture(test_config());
        session.connect().await.unwrap();
        let before = session.snapshot();
        session.connect().await.unwrap();
        assert_eq!(session.snapshot(), before);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_auth_sent_after_handshake() {
        let mut config = test_config();
        config.server.user_id = 12;
        config.server.user_name = "appraiser".into();
        let (session, sent) = session_with_capture(config);

        session.connect().await.unwrap();
        // Give the capture task a beat to drain the channel.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let frames = sent.lock().unwrap().clone();
        assert_eq!(frames.len(), 1);
        let auth = Envelope::from_json(&frames[0]).unwrap();
        assert_eq!(auth.message_type, MessageType::Auth);
        assert_eq!(auth.user_id, Some(12));
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_send_queues_when_disconnected_and_drops_oldest() {
        let (session, sent) = session_with_capture(test_config());

        // Queue bound is 5: send 8, expect the last 5 delivered in order.
        for i in 0..8 {
            session
                .send(Envelope::with_payload(
                    MessageType::Test,
                    serde_json::json!({ "seq": i }),
                ))
                .await;
        }

        session.connect().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let frames = sent.lock().unwrap().clone();
        let seqs: Vec<i64> = frames
            .iter()
            .map(|f| Envelope::from_json(f).unwrap().payload.unwrap()["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, vec![3, 4, 5, 6, 7]);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_send_transmits_directly_when_connected() {
        let (session, sent) = session_with_capture(test_config());
        session.connect().await.unwrap();

        session.send(Envelope::new(MessageType::Test)).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let frames = sent.lock().unwrap().clone();
        assert_eq!(frames.len(), 1);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (session, _sent) = session_with_capture(test_config());
        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_inbound_frame_dispatches_to_subscribers() {
        let (session, _sent) = session_with_capture(test_config());
        let mut rx = session.dispatcher().subscribe();

        session.connect().await.unwrap();
        let envelope = Envelope::with_payload(
            MessageType::EditOperation,
            serde_json::json!({"parcel": "11-0452"}),
        );
        session.inner.on_frame(&envelope.to_json().unwrap()).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.message_type, MessageType::EditOperation);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped_without_status_change() {
        let (session, _sent) = session_with_capture(test_config());
        session.connect().await.unwrap();

        session.inner.on_frame("{not json").await;
        session.inner.on_frame(r#"{"type":"galaxy_sync","timestamp":1}"#).await;

        assert_eq!(session.status(), ConnectionStatus::Connected);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_inbound_ping_answered_with_pong() {
        let (session, sent) = session_with_capture(test_config());
        session.connect().await.unwrap();

        session
            .inner
            .on_frame(&Envelope::ping().to_json().unwrap())
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let frames = sent.lock().unwrap().clone();
        let last = Envelope::from_json(frames.last().unwrap()).unwrap();
        assert_eq!(last.message_type, MessageType::Pong);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_pong_updates_latency_metric() {
        let (session, _sent) = session_with_capture(test_config());
        session.connect().await.unwrap();

        *session.inner.awaiting_pong.lock().await = Some(Instant::now());
        session
            .inner
            .on_frame(&Envelope::pong().to_json().unwrap())
            .await;

        assert!(session.snapshot().metrics.latency_ms.is_some());
        session.disconnect().await;
    }
}
