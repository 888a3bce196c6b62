// src/core/session/plc.rs

//! PLC session: link handshake, telemetry ingest, command dispatch, RPS
//! mirror (spec.md §4.3). State machine fields only — the network loop
//! that drives packets into/out of a session lives in the server layer.

use super::SessionMeta;
use crate::core::protocol::rplc::{ReactorTelemetry, RpsStatus, WasteMode};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug)]
pub struct PlcSession {
    pub meta: SessionMeta,
    pub reactor_id: u32,
    pub telemetry: ReactorTelemetry,
    pub rps: RpsStatus,
    /// Last `set_burn_rate` the supervisor asked for, and how many ticks
    /// it has gone un-converged. Re-sent every `burn_resend_ticks` per
    /// spec.md §4.3 until the PLC's reported burn matches within
    /// tolerance.
    pub pending_burn_rate: Option<PendingBurnRate>,
}

#[derive(Debug, Clone, Copy)]
pub struct PendingBurnRate {
    pub target: f64,
    pub ticks_since_sent: u32,
}

/// Commanded burn is considered converged within this fraction of target.
const BURN_RATE_TOLERANCE: f64 = 0.02;

impl PlcSession {
    pub fn new(id: u64, remote_addr: SocketAddr, reactor_id: u32, version: u16, timeout: Duration) -> Self {
        Self {
            meta: SessionMeta::new(id, remote_addr, version, timeout),
            reactor_id,
            telemetry: ReactorTelemetry::default(),
            rps: RpsStatus {
                tripped: false,
                force_disabled: false,
                trip_causes: 0,
            },
            pending_burn_rate: None,
        }
    }

    pub fn apply_telemetry(&mut self, telemetry: ReactorTelemetry) {
        self.telemetry = telemetry;
    }

    pub fn apply_rps_status(&mut self, status: RpsStatus) {
        self.rps = status;
    }

    /// Records an operator-issued burn-rate setpoint to track toward.
    pub fn set_burn_rate_target(&mut self, target: f64) {
        self.pending_burn_rate = Some(PendingBurnRate {
            target,
            ticks_since_sent: 0,
        });
    }

    /// Called once per tick. Returns `Some(target)` if the setpoint should
    /// be (re)sent on the wire this tick, clearing the pending state if the
    /// PLC's last reported burn has converged.
    pub fn tick_burn_rate(&mut self, resend_every_ticks: u32) -> Option<f64> {
        let pending = self.pending_burn_rate?;
        let converged = pending.target.abs() > f64::EPSILON
            && ((self.telemetry.act_burn_rate_mb_t - pending.target).abs() / pending.target)
                <= BURN_RATE_TOLERANCE;
        if converged {
            self.pending_burn_rate = None;
            return None;
        }
        let pending = self.pending_burn_rate.as_mut().unwrap();
        if pending.ticks_since_sent == 0 || pending.ticks_since_sent >= resend_every_ticks {
            pending.ticks_since_sent = 0;
            let target = pending.target;
            self.pending_burn_rate.as_mut().unwrap().ticks_since_sent = 1;
            Some(target)
        } else {
            pending.ticks_since_sent += 1;
            None
        }
    }

    pub fn waste_mode(&self) -> WasteMode {
        WasteMode::Auto
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> PlcSession {
        PlcSession::new(1, "127.0.0.1:16241".parse().unwrap(), 1, 1, Duration::from_secs(5))
    }

    #[test]
    fn resends_burn_rate_until_converged() {
        let mut s = session();
        s.set_burn_rate_target(5.0);
        assert_eq!(s.tick_burn_rate(3), Some(5.0));
        assert_eq!(s.tick_burn_rate(3), None);
        assert_eq!(s.tick_burn_rate(3), None);
        assert_eq!(s.tick_burn_rate(3), Some(5.0));

        s.telemetry.act_burn_rate_mb_t = 5.0;
        assert_eq!(s.tick_burn_rate(3), None);
        assert!(s.pending_burn_rate.is_none());
    }
}
