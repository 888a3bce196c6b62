// src/connection/mod.rs

//! Connection-facing glue between the datagram transport and the session
//! registry: inbound routing and per-session RAII cleanup.

pub mod dispatch;
pub mod guard;
pub mod router;

pub use guard::SessionGuard;
pub use router::{route_inbound, RouterContext};
