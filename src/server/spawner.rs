// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use super::facility_task::{self, FacilityTaskContext};
use super::metrics_server;
use anyhow::Result;
use tracing::info;

/// Spawns all critical background tasks into the provided JoinSet.
pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let facility_ctx = FacilityTaskContext {
        registry: ctx.registry.clone(),
        facility: ctx.facility.clone(),
        transport: ctx.transport.clone(),
        config: ctx.config.clone(),
    };
    let shutdown_rx_facility = ctx.shutdown_tx.subscribe();
    ctx.background_tasks
        .spawn(async move { facility_task::run(facility_ctx, shutdown_rx_facility).await });

    if ctx.config.metrics_enabled {
        let port = ctx.config.metrics_port;
        let shutdown_rx_metrics = ctx.shutdown_tx.subscribe();
        ctx.background_tasks.spawn(async move {
            metrics_server::run_metrics_server(port, shutdown_rx_metrics).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    info!("All background tasks have been spawned.");
    Ok(())
}
