// src/server/context.rs

use crate::config::SupervisorConfig;
use crate::core::facility::FacilityState;
use crate::core::session::SessionRegistry;
use crate::core::transport::DatagramTransport;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the supervisor's main
/// loop, grounded on the teacher's `ServerContext`.
pub struct ServerContext {
    pub registry: Arc<SessionRegistry>,
    pub facility: Arc<Mutex<FacilityState>>,
    pub transport: Arc<dyn DatagramTransport>,
    pub config: Arc<SupervisorConfig>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}
