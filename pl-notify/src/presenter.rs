//! Connection notification presenter.
//!
//! Renders broadcaster state as a desktop notification: a persistent but
//! dismissible notice once connectivity degrades to the fallback transport
//! or errors out, auto-hidden a fixed duration after the connection is
//! restored. Consumes only the broadcaster's public snapshot shape and
//! exposes a manual-reconnect hook for the embedder to wire up.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use pl_core::config::NotificationConfig;
use pl_socket::{ConnectionStatus, StatusBroadcaster, StatusSnapshot, Subscription, TransportKind};

use crate::service::{Service, ServiceState};

type ReconnectHook = Arc<dyn Fn() + Send + Sync>;

struct PresenterState {
    service_state: ServiceState,
    /// Whether the degrade notice is currently shown.
    visible: bool,
    /// User dismissed the notice for the current degrade episode.
    dismissed: bool,
    /// Whether the previous snapshot was degraded.
    was_degraded: bool,
    /// Pending auto-hide timer, at most one.
    auto_hide: Option<JoinHandle<()>>,
}

struct PresenterInner {
    config: NotificationConfig,
    state: Mutex<PresenterState>,
    reconnect_hook: Mutex<Option<ReconnectHook>>,
}

impl PresenterInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, PresenterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Presents connection health as desktop notifications.
///
/// Cloning shares the same presenter.
#[derive(Clone)]
pub struct ConnectionPresenter {
    inner: Arc<PresenterInner>,
}

impl ConnectionPresenter {
    /// Create a presenter with the given notification settings.
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            inner: Arc::new(PresenterInner {
                config,
                state: Mutex::new(PresenterState {
                    service_state: ServiceState::Created,
                    visible: false,
                    dismissed: false,
                    was_degraded: false,
                    auto_hide: None,
                }),
                reconnect_hook: Mutex::new(None),
            }),
        }
    }

    /// Wire the manual-reconnect action, typically to
    /// `ConnectionSession::reconnect`.
    pub fn set_reconnect_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self
            .inner
            .reconnect_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    /// Invoke the manual-reconnect action, if wired.
    pub fn trigger_reconnect(&self) {
        let hook = self
            .inner
            .reconnect_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match hook {
            Some(hook) => {
                info!("manual reconnect triggered from notification");
                hook();
            }
            None => debug!("no reconnect hook wired"),
        }
    }

    /// Subscribe this presenter to a broadcaster.
    ///
    /// The caller keeps the subscription for the presenter's lifetime.
    pub fn attach(&self, broadcaster: &StatusBroadcaster) -> Subscription {
        let presenter = self.clone();
        broadcaster.subscribe(move |snapshot| presenter.on_snapshot(snapshot))
    }

    /// Whether the degrade notice is currently shown.
    pub fn is_visible(&self) -> bool {
        self.inner.lock().visible
    }

    /// Dismiss the current notice; it stays hidden for the rest of this
    /// degrade episode.
    pub fn dismiss(&self) {
        let mut state = self.inner.lock();
        state.dismissed = true;
        state.visible = false;
        debug!("connection notice dismissed");
    }

    /// React to a broadcaster snapshot.
    ///
    /// Degraded means the fallback transport is in use or the session is
    /// errored; a reconnecting native socket is left to recover silently.
    pub fn on_snapshot(&self, snapshot: &StatusSnapshot) {
        if is_degraded(snapshot) {
            let show = {
                let mut state = self.inner.lock();
                if state.service_state != ServiceState::Running {
                    return;
                }
                if let Some(timer) = state.auto_hide.take() {
                    timer.abort();
                }
                if !state.was_degraded {
                    // New episode: a previous dismissal no longer applies.
                    state.was_degraded = true;
                    state.dismissed = false;
                }
                let show = self.inner.config.notify_on_degrade
                    && !state.dismissed
                    && !state.visible;
                if show {
                    state.visible = true;
                }
                show
            };
            if show {
                self.show_notice(&degrade_summary(snapshot), "Reconnect from the status panel.");
            }
        } else if snapshot.status == ConnectionStatus::Connected {
            let restored = {
                let mut state = self.inner.lock();
                if !state.was_degraded {
                    return;
                }
                state.was_degraded = false;
                state.dismissed = false;
                let restored = state.visible;
                if restored {
                    if let Some(timer) = state.auto_hide.take() {
                        timer.abort();
                    }
                    let inner = self.inner.clone();
                    let delay = Duration::from_millis(self.inner.config.auto_hide_ms);
                    state.auto_hide = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        inner.lock().visible = false;
                        debug!("connection notice auto-hidden");
                    }));
                }
                restored
            };
            if restored {
                self.show_notice("Connection restored", "Live updates are flowing again.");
            }
        }
    }

    /// Actually show the native notification.
    fn show_notice(&self, title: &str, body: &str) {
        #[cfg(not(test))]
        {
            let result = notify_rust::Notification::new()
                .summary(title)
                .body(body)
                .appname("ParcelLive")
                .show();
            if let Err(e) = result {
                tracing::warn!("desktop notification failed: {e}");
            }
        }

        let _ = (title, body);
        info!("connection notice: {title}");
    }
}

fn is_degraded(snapshot: &StatusSnapshot) -> bool {
    snapshot.status == ConnectionStatus::Errored
        || snapshot.transport == TransportKind::LongPoll
}

fn degrade_summary(snapshot: &StatusSnapshot) -> String {
    match snapshot.status {
        ConnectionStatus::Errored => match &snapshot.metrics.last_error {
            Some(error) => format!("Connection failed: {error}"),
            None => "Connection failed".to_string(),
        },
        _ => "Live updates degraded to polling".to_string(),
    }
}

impl Service for ConnectionPresenter {
    fn name(&self) -> &str {
        "connection-notify"
    }

    fn state(&self) -> ServiceState {
        self.inner.lock().service_state
    }

    fn init(&mut self) -> pl_core::error::PlResult<()> {
        self.inner.lock().service_state = ServiceState::Running;
        info!("connection notification presenter initialized");
        Ok(())
    }

    fn shutdown(&mut self) -> pl_core::error::PlResult<()> {
        let mut state = self.inner.lock();
        state.service_state = ServiceState::Stopped;
        if let Some(timer) = state.auto_hide.take() {
            timer.abort();
        }
        Ok(())
    }
}
