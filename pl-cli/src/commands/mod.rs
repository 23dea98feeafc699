//! CLI command implementations.

pub mod connect;
pub mod logs;
pub mod status;

use pl_core::config::ConfigHandle;
use pl_core::error::PlResult;
use pl_socket::{ConnectionSession, MessageDispatcher, StatusBroadcaster};

/// Helper to build the realtime stack from config.
///
/// Returns the session plus the broadcaster and dispatcher it publishes to.
pub async fn create_session(
    config: &ConfigHandle,
) -> PlResult<(ConnectionSession, StatusBroadcaster, MessageDispatcher)> {
    let app_config = config.read().await.clone();
    let broadcaster = StatusBroadcaster::new();
    let dispatcher = MessageDispatcher::new(256);
    let session = ConnectionSession::new(app_config, broadcaster.clone(), dispatcher.clone())?;
    Ok((session, broadcaster, dispatcher))
}
