// src/server/connection_loop.rs

//! Contains the main server loop for accepting inbound datagrams and
//! handling graceful shutdown.

use super::context::ServerContext;
use crate::connection::RouterContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

// Platform-specific signal handling imports
#[cfg(windows)]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Waits for a shutdown signal based on the operating system.
/// On Unix, it listens for SIGINT and SIGTERM.
/// On Windows, it listens for Ctrl+C.
async fn await_shutdown_signal() {
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to create SIGINT stream");
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to create SIGTERM stream");

    #[cfg(windows)]
    let mut ctrl_c = signal::ctrl_c().expect("Failed to create Ctrl+C stream");

    tokio::select! {
        _ = async { #[cfg(unix)] { sigint.recv().await; info!("SIGINT received, initiating graceful shutdown."); } } => {},
        _ = async { #[cfg(unix)] { sigterm.recv().await; info!("SIGTERM received, initiating graceful shutdown."); } } => {},
        _ = async { #[cfg(windows)] { ctrl_c.await; info!("Ctrl-C received, initiating graceful shutdown."); } } => {},
    }
}

/// The main server loop: drains inbound datagrams off the transport and
/// hands each one to the router, while watching for a shutdown signal and
/// for any background task (the facility scheduler, the metrics server)
/// terminating unexpectedly.
pub async fn run(mut ctx: ServerContext) {
    let router_ctx = Arc::new(RouterContext {
        registry: ctx.registry.clone(),
        facility: ctx.facility.clone(),
        transport: ctx.transport.clone(),
        config: ctx.config.clone(),
    });
    let mut dispatch_tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased; // Prioritize shutdown signals over other events.

            _ = await_shutdown_signal() => {
                break;
            },

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => info!("A background task has completed unexpectedly. Shutting down."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); }
                }
                break;
            },

            res = ctx.transport.recv() => {
                match res {
                    Ok(inbound) => {
                        let router_ctx = router_ctx.clone();
                        dispatch_tasks.spawn(async move {
                            crate::connection::route_inbound(&router_ctx, inbound).await;
                        });
                    }
                    Err(e) => {
                        error!("Transport failed: {}. Shutting down.", e);
                        break;
                    }
                }
            },

            Some(res) = dispatch_tasks.join_next() => {
                if let Err(e) = res {
                    if e.is_panic() {
                        error!("An inbound-routing task panicked: {e:?}");
                    }
                }
            },
        }
    }

    // --- Graceful Shutdown Sequence ---
    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
    }

    dispatch_tasks.shutdown().await;
    info!("All inbound-routing tasks stopped.");

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    }
    info!("Supervisor shutdown complete.");
}
