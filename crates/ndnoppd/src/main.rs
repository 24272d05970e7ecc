//! ndnoppd — opportunistic NDN daemon.
//!
//! Runs beside a host process that owns the forwarding engine and the Wi-Fi
//! P2P stack. Host events arrive as JSON lines on stdin, commands leave as
//! JSON lines on stdout; logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use ndnopp_core::config::OppConfig;
use ndnopp_core::identity;
use ndnopp_services::Daemon;

mod bridge;

use bridge::{HostBridge, HostCommand, HostEvent};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Load config
    if let Err(e) = OppConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = OppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        OppConfig::default()
    });

    let local_id = identity::load_or_create(&config.identity.uuid_path)
        .context("failed to load installation identity")?;
    tracing::info!(local = %local_id, service_type = %config.discovery.service_type, "ndnoppd starting");

    // Host bridge
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<HostCommand>();
    let bridge = Arc::new(HostBridge::new(command_tx));
    let daemon = Arc::new(Daemon::new(config.clone(), local_id, bridge.adapters()));

    let writer_task = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(command) = command_rx.recv().await {
            let mut line = match serde_json::to_vec(&command) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, ?command, "failed to encode host command");
                    continue;
                }
            };
            line.push(b'\n');
            if let Err(e) = stdout.write_all(&line).await {
                tracing::error!(error = %e, "host command stream closed");
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // Status HTTP endpoint
    if config.api.port != 0 {
        let state = ndnopp_api::ApiState {
            daemon: daemon.clone(),
            shutdown_tx: shutdown_tx.clone(),
        };
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = ndnopp_api::serve(state, port).await {
                tracing::error!(error = %e, "status server failed");
            }
        });
    }

    daemon.start().context("failed to start daemon")?;

    // ── Event loop ───────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut flush = tokio::time::interval(Duration::from_secs(config.transfer.flush_interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("shutting down");
                break;
            }
            _ = flush.tick() => {
                if let Ok(dispatched) = daemon.flush_pending() {
                    if dispatched > 0 {
                        tracing::debug!(dispatched, "periodic flush");
                    }
                }
            }
            line = lines.next_line() => {
                let line = match line.context("failed to read host event")? {
                    Some(line) => line,
                    None => {
                        tracing::info!("host closed the event stream");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<HostEvent>(&line) {
                    Ok(event) => {
                        if let Err(e) = bridge::deliver(&daemon, &bridge, event) {
                            tracing::warn!(error = %e, "host event rejected");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, line = %line, "malformed host event"),
                }
            }
        }
    }

    daemon.stop().context("failed to stop daemon")?;
    bridge.close();
    if let Err(e) = writer_task.await {
        tracing::error!(error = %e, "host command writer failed");
    }
    Ok(())
}
