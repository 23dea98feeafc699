//! Connect command - establish a persistent connection to the server.

use console::style;
use dialoguer::Input;
use tracing::error;

use pl_core::config::{AppConfig, ConfigHandle};
use pl_core::error::{PlError, PlResult};
use pl_core::platform::Platform;
use pl_notify::{ConnectionPresenter, Service};
use pl_socket::ConnectionStatus;

/// Run the connect command.
pub async fn run(
    config: ConfigHandle,
    address: Option<String>,
    user_id: Option<u64>,
    user_name: Option<String>,
    save_config: bool,
) -> PlResult<()> {
    // Determine address: arg > config > interactive prompt
    let addr = if let Some(a) = address {
        a
    } else {
        let current = config.read().await.server.address.clone();
        if current.is_empty() {
            Input::new()
                .with_prompt("Server address")
                .interact_text()
                .map_err(|e| PlError::Internal(e.to_string()))?
        } else {
            current
        }
    };

    // Apply to config
    {
        let mut cfg = config.write().await;
        cfg.server.address = AppConfig::sanitize_server_address(&addr);
        if let Some(id) = user_id {
            cfg.server.user_id = id;
        }
        if let Some(name) = user_name {
            cfg.server.user_name = name;
        }
        // An authenticated user needs some display name on the wire.
        if cfg.server.user_id != 0 && cfg.server.user_name.is_empty() {
            cfg.server.user_name = Platform::hostname();
        }
    }

    if config.read().await.server.address.is_empty() {
        error!("no server address configured. Use --address or set it in config.");
        return Err(PlError::MissingConfig("server address".into()));
    }

    // Optionally save config to disk
    if save_config {
        config.save().await?;
        println!("  {} Config saved.", style("OK").green());
    }

    println!(
        "{} Connecting to {}...",
        style("[1/2]").bold().dim(),
        config.read().await.server.address
    );

    let (session, broadcaster, dispatcher) = super::create_session(&config).await?;
    let mut messages = dispatcher.subscribe();
    let mut status_rx = broadcaster.watch_receiver();

    // Wire the notification presenter to the broadcaster
    let notification_config = config.read().await.notifications.clone();
    let mut presenter = ConnectionPresenter::new(notification_config);
    presenter.init()?;
    let _presenter_sub = presenter.attach(&broadcaster);
    let reconnect_session = session.clone();
    presenter.set_reconnect_hook(move || {
        let session = reconnect_session.clone();
        tokio::spawn(async move { session.reconnect().await });
    });

    session.connect().await?;
    match session.status() {
        ConnectionStatus::Connected => {
            println!(
                "{} {} Connected via {}. Streaming updates... (Ctrl+C to stop)",
                style("[2/2]").bold().dim(),
                style("OK").green().bold(),
                session.snapshot().transport,
            );
        }
        status => {
            println!(
                "{} {} First attempt failed ({status}); retrying in the background...",
                style("[2/2]").bold().dim(),
                style("WARN").yellow().bold(),
            );
        }
    }
    println!();

    // Stream messages and status transitions
    loop {
        tokio::select! {
            message = messages.recv() => {
                match message {
                    Ok(envelope) => {
                        println!(
                            "  {} {}",
                            style(format!("[{}]", envelope.message_type.as_str())).cyan(),
                            envelope.payload.unwrap_or(serde_json::Value::Null)
                        );
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        println!(
                            "  {} Missed {n} messages (slow consumer)",
                            style("WARN").yellow()
                        );
                    }
                    Err(_) => break,
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status_rx.borrow_and_update().clone();
                println!(
                    "  {} {} via {} (reconnects: {})",
                    style("[status]").magenta(),
                    snapshot.status,
                    snapshot.transport,
                    snapshot.metrics.reconnect_count,
                );
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n  Disconnecting...");
                session.disconnect().await;
                break;
            }
        }
    }

    presenter.shutdown()?;
    Ok(())
}
