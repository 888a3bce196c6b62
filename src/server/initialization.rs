// src/server/initialization.rs

//! Handles the complete server initialization process: loading and
//! validating the settings blob, building the facility's unit topology,
//! and opening the transport's channels before the main loop starts.

use super::context::ServerContext;
use crate::config::SupervisorConfig;
use crate::core::facility::{FacilityState, Unit};
use crate::core::session::{self, SessionRegistry};
use crate::core::transport::udp::UdpTransport;
use crate::core::transport::DatagramTransport;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::info;

/// Initializes all server components before starting the main loop.
pub async fn setup(config: SupervisorConfig) -> Result<ServerContext> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("configuration invalid: {e}"))?;
    log_startup_info(&config);

    let units: Vec<Unit> = config
        .cooling_config
        .iter()
        .enumerate()
        .map(|(i, cooling)| Unit::new((i + 1) as u32, cooling.boiler_count, cooling.turbine_count))
        .collect();
    let facility = FacilityState::new(
        config.unit_count,
        units,
        config.facility_tank_mode,
        config.facility_tank_defs.clone(),
    );

    let registry = SessionRegistry::new(session::COMMS_VERSION);

    let bind_addr: std::net::IpAddr = config
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind_addr '{}': {e}", config.bind_addr))?;
    let transport = UdpTransport::new(bind_addr);
    for channel in [
        config.svr_channel,
        config.plc_channel,
        config.rtu_channel,
        config.crd_channel,
        config.pkt_channel,
    ] {
        transport.open(channel).await?;
    }
    info!(
        svr = config.svr_channel,
        plc = config.plc_channel,
        rtu = config.rtu_channel,
        crd = config.crd_channel,
        pkt = config.pkt_channel,
        "channels opened"
    );

    let (shutdown_tx, _) = broadcast::channel(1);

    Ok(ServerContext {
        registry: Arc::new(registry),
        facility: Arc::new(Mutex::new(facility)),
        transport: Arc::new(transport) as Arc<dyn DatagramTransport>,
        config: Arc::new(config),
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &SupervisorConfig) {
    info!(
        unit_count = config.unit_count,
        tank_mode = config.facility_tank_mode,
        bind_addr = %config.bind_addr,
        "supervisor starting"
    );
    if config.metrics_enabled {
        info!(port = config.metrics_port, "metrics endpoint enabled");
    } else {
        info!("metrics endpoint disabled");
    }
    if config.auth_key.is_none() {
        tracing::warn!("WARNING: no auth_key configured, frames are not authenticated.");
    }
}
