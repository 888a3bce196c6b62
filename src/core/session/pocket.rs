// src/core/session/pocket.rs

//! Pocket session: the handheld read-only console. Receives the same
//! `FAC_STATUS`/`UNIT_STATUS` pushes as a coordinator session but never
//! issues `FAC_CMD`/`UNIT_CMD` (spec.md §1 "Pocket: handheld read-only
//! console").

use super::SessionMeta;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug)]
pub struct PocketSession {
    pub meta: SessionMeta,
}

impl PocketSession {
    pub fn new(id: u64, remote_addr: SocketAddr, version: u16, timeout: Duration) -> Self {
        Self {
            meta: SessionMeta::new(id, remote_addr, version, timeout),
        }
    }
}
