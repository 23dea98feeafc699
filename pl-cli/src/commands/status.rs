//! Status command - show configuration and probe connectivity.

use std::time::Instant;

use console::style;

use pl_core::config::ConfigHandle;
use pl_core::error::PlResult;
use crate::OutputFormat;

/// Run the status command.
pub async fn run(config: ConfigHandle, format: OutputFormat) -> PlResult<()> {
    let cfg = config.read().await.clone();

    if !cfg.is_server_configured() {
        match format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "configured": false,
                    }))
                    .unwrap_or_default()
                );
            }
            OutputFormat::Text => {
                println!(
                    "  {} No server configured. Run `parcellive connect --address <url>`.",
                    style("WARN").yellow().bold()
                );
            }
        }
        return Ok(());
    }

    // Probe connectivity with a single bounded attempt.
    let (session, _broadcaster, _dispatcher) = super::create_session(&config).await?;
    let start = Instant::now();
    session.connect().await?;
    let latency_ms = start.elapsed().as_millis() as u64;
    let snapshot = session.snapshot();
    session.disconnect().await;

    let reachable = snapshot.status == pl_socket::ConnectionStatus::Connected;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "configured": true,
                "server_address": cfg.server.address,
                "websocket_url": cfg.websocket_url()?,
                "polling_url": cfg.polling_url()?,
                "reachable": reachable,
                "handshake_ms": latency_ms,
                "snapshot": snapshot,
            });
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Text => {
            println!("  Server:      {}", cfg.server.address);
            println!("  Socket URL:  {}", cfg.websocket_url()?);
            if reachable {
                println!(
                    "  Reachable:   {} (handshake {}ms via {})",
                    style("yes").green().bold(),
                    latency_ms,
                    snapshot.transport,
                );
            } else {
                println!("  Reachable:   {}", style("no").red().bold());
                if let Some(error) = &snapshot.metrics.last_error {
                    println!("  Last error:  {error}");
                }
            }
            if let Some(connected_at) = snapshot.metrics.last_connected_at {
                println!(
                    "  Connected:   {}",
                    connected_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
    }

    Ok(())
}
