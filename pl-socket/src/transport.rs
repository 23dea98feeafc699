//! Transport abstraction and concrete connectors.
//!
//! A transport is opened by a [`Connector`] and handed to the session as a
//! [`TransportHandle`]: an outbound frame channel, an inbound event stream
//! produced by a background I/O task, and a graceful-close signal. The
//! session owns the handle exclusively; everything protocol-shaped lives in
//! the session, so the connectors here stay thin I/O glue.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use pl_core::config::AppConfig;
use pl_core::constants;
use pl_core::error::{PlError, PlResult};

use crate::probe::TransportKind;

/// Event emitted by a transport's I/O task.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A text frame arrived.
    Message(String),
    /// The transport closed. `clean` when the closure was acknowledged
    /// (close frame exchanged or a requested shutdown).
    Closed { reason: String, clean: bool },
}

/// Resolved connection endpoint for one attempt.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    /// Transport this target is for.
    pub kind: TransportKind,
    /// Fully derived URL.
    pub url: String,
}

impl ConnectTarget {
    /// Derive the target for the given transport from configuration.
    pub fn from_config(config: &AppConfig, kind: TransportKind) -> PlResult<Self> {
        let url = match kind {
            TransportKind::NativeSocket => config.websocket_url()?,
            TransportKind::LongPoll => config.polling_url()?,
        };
        Ok(Self { kind, url })
    }
}

/// A live connection whose handshake has completed.
///
/// Owned exclusively by the session: dropping or closing the handle tears
/// down the I/O task, and no two live handles coexist for one session.
pub struct TransportHandle {
    kind: TransportKind,
    outbound: mpsc::Sender<String>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    close_tx: Option<oneshot::Sender<()>>,
    io_task: JoinHandle<()>,
}

impl TransportHandle {
    /// Assemble a handle from its parts.
    ///
    /// Public so embedders (and tests) can supply custom transports behind
    /// the [`Connector`] seam.
    pub fn new(
        kind: TransportKind,
        outbound: mpsc::Sender<String>,
        events: mpsc::Receiver<TransportEvent>,
        close_tx: oneshot::Sender<()>,
        io_task: JoinHandle<()>,
    ) -> Self {
        Self {
            kind,
            outbound,
            events: Some(events),
            close_tx: Some(close_tx),
            io_task,
        }
    }

    /// The transport kind carrying this connection.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Take the inbound event stream. Yields `Some` exactly once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events.take()
    }

    /// Queue a text frame for transmission, in order.
    pub async fn send(&self, text: String) -> PlResult<()> {
        self.outbound
            .send(text)
            .await
            .map_err(|_| PlError::Transport("transport io task gone".into()))
    }

    /// Close gracefully: request a close frame, allow the peer's
    /// acknowledgement up to the grace period, then force teardown.
    pub async fn close(mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        let grace = std::time::Duration::from_millis(constants::CLOSE_GRACE_PERIOD_MS);
        if tokio::time::timeout(grace, &mut self.io_task).await.is_err() {
            debug!("close grace period elapsed, aborting transport io task");
            self.io_task.abort();
        }
    }

    /// Tear down immediately without the close handshake.
    pub fn abort(self) {
        self.io_task.abort();
    }
}

/// Opens transport connections. Resolving [`Connector::connect`] means the
/// handshake completed and frames can flow.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &ConnectTarget) -> PlResult<TransportHandle>;
}

/// Native WebSocket connector.
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, target: &ConnectTarget) -> PlResult<TransportHandle> {
        let (stream, _response) = connect_async(target.url.as_str())
            .await
            .map_err(|e| PlError::Transport(e.to_string()))?;
        debug!("websocket open: {}", target.url);

        let (mut write, mut read) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(64);
        let (close_tx, mut close_rx) = oneshot::channel::<()>();

        let io_task = tokio::spawn(async move {
            let mut close_requested = false;
            loop {
                tokio::select! {
                    outgoing = out_rx.recv(), if !close_requested => {
                        match outgoing {
                            Some(text) => {
                                if let Err(e) = write.send(Message::Text(text)).await {
                                    let _ = event_tx
                                        .send(TransportEvent::Closed {
                                            reason: format!("write failed: {e}"),
                                            clean: false,
                                        })
                                        .await;
                                    break;
                                }
                            }
                            // Handle dropped without close(): shut down.
                            None => {
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                        }
                    }
                    _ = &mut close_rx, if !close_requested => {
                        close_requested = true;
                        let _ = write.send(Message::Close(None)).await;
                        // Keep reading until the peer acknowledges.
                    }
                    frame = read.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                if event_tx.send(TransportEvent::Message(text)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) => {
                                let _ = event_tx
                                    .send(TransportEvent::Closed {
                                        reason: "close frame received".into(),
                                        clean: close_requested,
                                    })
                                    .await;
                                break;
                            }
                            // Protocol ping/pong and binary frames are not
                            // part of the envelope stream.
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                let _ = event_tx
                                    .send(TransportEvent::Closed {
                                        reason: e.to_string(),
                                        clean: false,
                                    })
                                    .await;
                                break;
                            }
                            None => {
                                let _ = event_tx
                                    .send(TransportEvent::Closed {
                                        reason: "stream ended".into(),
                                        clean: close_requested,
                                    })
                                    .await;
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(TransportHandle::new(
            target.kind,
            out_tx,
            event_rx,
            close_tx,
            io_task,
        ))
    }
}

/// HTTP long-polling connector.
///
/// Handshake is a GET returning `{"sid": ...}`; afterwards the I/O task
/// long-polls with GETs (each response body carries zero or more
/// newline-delimited frames) and POSTs outbound frames, all against the
/// same query-tagged endpoint.
pub struct PollConnector {
    client: reqwest::Client,
}

impl PollConnector {
    /// Build a connector, optionally accepting self-signed certificates.
    pub fn new(accept_self_signed_certs: bool) -> PlResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(accept_self_signed_certs)
            .build()
            .map_err(|e| PlError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

/// Split a long-poll response body into individual frames.
fn split_poll_frames(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

async fn poll_once(client: reqwest::Client, url: String) -> Result<Vec<String>, String> {
    let response = client.get(&url).send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("poll status {}", response.status()));
    }
    let body = response.text().await.map_err(|e| e.to_string())?;
    Ok(split_poll_frames(&body))
}

#[async_trait]
impl Connector for PollConnector {
    async fn connect(&self, target: &ConnectTarget) -> PlResult<TransportHandle> {
        let response = self
            .client
            .get(&target.url)
            .send()
            .await
            .map_err(|e| PlError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PlError::Http(format!(
                "polling handshake status {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlError::Http(format!("polling handshake body: {e}")))?;
        let sid = body
            .get("sid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PlError::Http("polling handshake missing sid".into()))?
            .to_string();
        debug!("long-poll session open: sid={sid}");

        let session_url = format!("{}&sid={sid}", target.url);
        let client = self.client.clone();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(64);
        let (close_tx, mut close_rx) = oneshot::channel::<()>();

        let io_task = tokio::spawn(async move {
            let poll = poll_once(client.clone(), session_url.clone());
            tokio::pin!(poll);
            let mut close_requested = false;
            loop {
                tokio::select! {
                    result = &mut poll => {
                        match result {
                            Ok(frames) => {
                                for frame in frames {
                                    if event_tx.send(TransportEvent::Message(frame)).await.is_err() {
                                        return;
                                    }
                                }
                                poll.set(poll_once(client.clone(), session_url.clone()));
                            }
                            Err(reason) => {
                                let _ = event_tx
                                    .send(TransportEvent::Closed { reason, clean: close_requested })
                                    .await;
                                return;
                            }
                        }
                    }
                    outgoing = out_rx.recv(), if !close_requested => {
                        match outgoing {
                            Some(text) => {
                                if let Err(e) = client.post(&session_url).body(text).send().await {
                                    warn!("long-poll send failed: {e}");
                                    let _ = event_tx
                                        .send(TransportEvent::Closed {
                                            reason: format!("send failed: {e}"),
                                            clean: false,
                                        })
                                        .await;
                                    return;
                                }
                            }
                            None => return,
                        }
                    }
                    _ = &mut close_rx, if !close_requested => {
                        close_requested = true;
                        // No close handshake over plain HTTP; stop polling.
                        return;
                    }
                }
            }
        });

        Ok(TransportHandle::new(
            target.kind,
            out_tx,
            event_rx,
            close_tx,
            io_task,
        ))
    }
}

/// Production connector dispatching to the WebSocket or long-poll
/// implementation based on the target's transport kind.
pub struct DefaultConnector {
    ws: WsConnector,
    poll: PollConnector,
}

impl DefaultConnector {
    /// Build the default connector pair.
    pub fn new(accept_self_signed_certs: bool) -> PlResult<Self> {
        Ok(Self {
            ws: WsConnector,
            poll: PollConnector::new(accept_self_signed_certs)?,
        })
    }
}

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, target: &ConnectTarget) -> PlResult<TransportHandle> {
        match target.kind {
            TransportKind::NativeSocket => self.ws.connect(target).await,
            TransportKind::LongPoll => self.poll.connect(target).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(address: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.server.address = address.into();
        config
    }

    #[test]
    fn test_connect_target_native() {
        let target = ConnectTarget::from_config(
            &config_with("https://assess.example.com"),
            TransportKind::NativeSocket,
        )
        .unwrap();
        assert_eq!(target.url, "wss://assess.example.com/ws");
        assert_eq!(target.kind, TransportKind::NativeSocket);
    }

    #[test]
    fn test_connect_target_long_poll() {
        let target = ConnectTarget::from_config(
            &config_with("http://localhost:5000"),
            TransportKind::LongPoll,
        )
        .unwrap();
        assert_eq!(target.url, "http://localhost:5000/ws?EIO=4&transport=polling");
    }

    #[test]
    fn test_split_poll_frames() {
        let body = "{\"type\":\"test\",\"timestamp\":1}\n\n{\"type\":\"ping\",\"timestamp\":2}\n";
        let frames = split_poll_frames(body);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("test"));
        assert!(frames[1].contains("ping"));
    }

    #[test]
    fn test_split_poll_frames_empty_body() {
        assert!(split_poll_frames("").is_empty());
        assert!(split_poll_frames("\n\n").is_empty());
    }

    #[tokio::test]
    async fn test_handle_send_and_take_events() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(8);
        let (close_tx, _close_rx) = oneshot::channel();
        let io_task = tokio::spawn(async move {
            let _keep_alive = event_tx;
            std::future::pending::<()>().await;
        });

        let mut handle =
            TransportHandle::new(TransportKind::NativeSocket, out_tx, event_rx, close_tx, io_task);

        assert!(handle.take_events().is_some());
        assert!(handle.take_events().is_none());

        handle.send("frame".into()).await.unwrap();
        assert_eq!(out_rx.recv().await.unwrap(), "frame");

        handle.abort();
    }

    #[tokio::test]
    async fn test_handle_close_waits_for_io_task() {
        let (out_tx, _out_rx) = mpsc::channel(8);
        let (_event_tx, event_rx) = mpsc::channel(8);
        let (close_tx, close_rx) = oneshot::channel::<()>();
        // The io task exits promptly when the close signal arrives.
        let io_task = tokio::spawn(async move {
            let _ = close_rx.await;
        });

        let handle =
            TransportHandle::new(TransportKind::NativeSocket, out_tx, event_rx, close_tx, io_task);
        handle.close().await;
    }
}
