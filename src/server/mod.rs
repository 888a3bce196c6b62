// src/server/mod.rs

use crate::config::SupervisorConfig;
use anyhow::Result;

mod connection_loop;
mod context;
mod facility_task;
mod initialization;
mod metrics_server;
mod spawner;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: SupervisorConfig) -> Result<()> {
    // 1. Initialize the session registry, facility state, and transport.
    let mut server_context = initialization::setup(config).await?;

    // 2. Spawn all background tasks (facility scheduler, metrics server).
    spawner::spawn_all(&mut server_context).await?;

    // 3. Start the main inbound-datagram loop. Runs until shutdown.
    connection_loop::run(server_context).await;

    Ok(())
}
