// src/core/session/rtu.rs

//! RTU session and its per-entry device bookkeeping (spec.md §3 "RTU Unit
//! Entry", §4.4). `RtuUnitKind` replaces the original's runtime type-swap
//! with a tagged variant per Design Notes §9.

use super::SessionMeta;
use crate::core::errors::ScadaError;
use crate::core::modbus_server::{ModbusServer, RegisterMapServer};
use crate::core::protocol::scada_mgmt::{AdvertRejectReason, AdvertisedUnit, RtuUnitTypeWire};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtuUnitKind {
    BoilerValve,
    TurbineValve,
    DynamicValve,
    Imatrix,
    Sps,
    Sna,
    EnvDetector,
    Redstone,
    /// Device detached out-of-band; must be re-typed on reconnect (spec.md
    /// §4.4 "device detach").
    Virtual,
}

impl From<RtuUnitTypeWire> for RtuUnitKind {
    fn from(w: RtuUnitTypeWire) -> Self {
        match w {
            RtuUnitTypeWire::BoilerValve => RtuUnitKind::BoilerValve,
            RtuUnitTypeWire::TurbineValve => RtuUnitKind::TurbineValve,
            RtuUnitTypeWire::DynamicValve => RtuUnitKind::DynamicValve,
            RtuUnitTypeWire::Imatrix => RtuUnitKind::Imatrix,
            RtuUnitTypeWire::Sps => RtuUnitKind::Sps,
            RtuUnitTypeWire::Sna => RtuUnitKind::Sna,
            RtuUnitTypeWire::EnvDetector => RtuUnitKind::EnvDetector,
            RtuUnitTypeWire::Redstone => RtuUnitKind::Redstone,
        }
    }
}

impl RtuUnitKind {
    /// Multiblock kinds start `UNFORMED` and must observe an `isFormed()`
    /// transition before they're usable; simple I/O kinds start ready.
    pub fn is_multiblock(&self) -> bool {
        matches!(
            self,
            RtuUnitKind::BoilerValve
                | RtuUnitKind::TurbineValve
                | RtuUnitKind::DynamicValve
                | RtuUnitKind::Imatrix
                | RtuUnitKind::Sps
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwState {
    Offline,
    Unformed,
    Faulted,
    Ok,
}

pub struct RtuUnitEntry {
    pub uid: u32,
    pub kind: RtuUnitKind,
    pub name: String,
    pub index: u32,
    pub reactor: u32,
    pub hw_state: HwState,
    pub packet_queue: VecDeque<Vec<u8>>,
    /// Backing register file this entry's MODBUS requests are serviced
    /// against (spec.md §4.4 "MODBUS requests are handed to a MODBUS
    /// server instance"). Re-created on [`RtuUnitEntry::attach`] since a
    /// reattach may change which kind of device is actually present.
    pub server: Box<dyn ModbusServer>,
}

impl std::fmt::Debug for RtuUnitEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtuUnitEntry")
            .field("uid", &self.uid)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("index", &self.index)
            .field("reactor", &self.reactor)
            .field("hw_state", &self.hw_state)
            .finish_non_exhaustive()
    }
}

impl RtuUnitEntry {
    pub fn new(uid: u32, kind: RtuUnitKind, name: String, index: u32, reactor: u32) -> Self {
        let hw_state = if kind.is_multiblock() {
            HwState::Unformed
        } else {
            HwState::Ok
        };
        Self {
            uid,
            kind,
            name,
            index,
            reactor,
            hw_state,
            packet_queue: VecDeque::new(),
            server: Box::new(RegisterMapServer::for_kind(kind)),
        }
    }

    /// Device detached: mark offline and re-type as `Virtual` so a
    /// reconnect must supply a hardware kind again (spec.md §4.4).
    pub fn detach(&mut self) {
        self.hw_state = HwState::Offline;
        self.kind = RtuUnitKind::Virtual;
        self.server = Box::new(RegisterMapServer::for_kind(self.kind));
    }

    /// Device reattached, reporting `reported_kind`. A mismatch against the
    /// kind this entry was originally advertised as is an error, never an
    /// implicit retype (Design Notes §9).
    pub fn attach(&mut self, reported_kind: RtuUnitKind, expected_kind: RtuUnitKind) -> Result<(), ScadaError> {
        if reported_kind != expected_kind {
            return Err(ScadaError::DeviceKindMismatch {
                expected: format!("{expected_kind:?}"),
                actual: format!("{reported_kind:?}"),
            });
        }
        self.kind = expected_kind;
        self.hw_state = if expected_kind.is_multiblock() {
            HwState::Unformed
        } else {
            HwState::Ok
        };
        self.server = Box::new(RegisterMapServer::for_kind(self.kind));
        Ok(())
    }

    /// `isFormed()` poll transition, run every ~250ms per entry (spec.md
    /// §4.4). Returns true if this call caused a FALSE→TRUE remount.
    pub fn poll_formed(&mut self, formed: bool) -> bool {
        if formed && self.hw_state == HwState::Unformed {
            self.hw_state = HwState::Ok;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
pub struct RtuSession {
    pub meta: SessionMeta,
    pub units: Vec<RtuUnitEntry>,
}

impl RtuSession {
    pub fn new(id: u64, remote_addr: SocketAddr, version: u16, timeout: Duration) -> Self {
        Self {
            meta: SessionMeta::new(id, remote_addr, version, timeout),
            units: Vec::new(),
        }
    }
}

/// Outcome of validating one advertised unit against facility-wide
/// uniqueness rules and the target unit's boiler/turbine counts (spec.md
/// §4.4). Bundled so `establish_rtu` can build its accepted/rejected lists
/// in one pass.
pub struct AdvertValidation<'a> {
    pub unit_count: u8,
    pub boiler_count_of: &'a dyn Fn(u32) -> Option<u8>,
    pub turbine_count_of: &'a dyn Fn(u32) -> Option<u8>,
    pub has_imatrix: bool,
    pub has_sps: bool,
}

pub fn validate_advert(unit: &AdvertisedUnit, ctx: &AdvertValidation) -> Result<(), AdvertRejectReason> {
    if unit.reactor != 0 && unit.reactor > ctx.unit_count as u32 {
        return Err(AdvertRejectReason::BadReactorId);
    }
    match RtuUnitKind::from(unit.kind) {
        RtuUnitKind::Imatrix if ctx.has_imatrix => return Err(AdvertRejectReason::DuplicateImatrix),
        RtuUnitKind::Sps if ctx.has_sps => return Err(AdvertRejectReason::DuplicateSps),
        RtuUnitKind::BoilerValve => {
            let count = (ctx.boiler_count_of)(unit.reactor).unwrap_or(0);
            if unit.index == 0 || unit.index > count as u32 {
                return Err(AdvertRejectReason::BoilerIndexOutOfRange);
            }
        }
        RtuUnitKind::TurbineValve => {
            let count = (ctx.turbine_count_of)(unit.reactor).unwrap_or(0);
            if unit.index == 0 || unit.index > count as u32 {
                return Err(AdvertRejectReason::TurbineIndexOutOfRange);
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_second_induction_matrix_as_duplicate() {
        let unit = AdvertisedUnit {
            kind: RtuUnitTypeWire::Imatrix,
            name: "ind2".into(),
            index: 1,
            reactor: 0,
        };
        let ctx = AdvertValidation {
            unit_count: 4,
            boiler_count_of: &|_| Some(2),
            turbine_count_of: &|_| Some(2),
            has_imatrix: true,
            has_sps: false,
        };
        assert_eq!(validate_advert(&unit, &ctx), Err(AdvertRejectReason::DuplicateImatrix));
    }

    #[test]
    fn rejects_boiler_index_out_of_range() {
        let unit = AdvertisedUnit {
            kind: RtuUnitTypeWire::BoilerValve,
            name: "b3".into(),
            index: 3,
            reactor: 1,
        };
        let ctx = AdvertValidation {
            unit_count: 1,
            boiler_count_of: &|_| Some(2),
            turbine_count_of: &|_| Some(2),
            has_imatrix: false,
            has_sps: false,
        };
        assert_eq!(
            validate_advert(&unit, &ctx),
            Err(AdvertRejectReason::BoilerIndexOutOfRange)
        );
    }

    #[test]
    fn detach_then_mismatched_reattach_is_an_error() {
        let mut entry = RtuUnitEntry::new(1, RtuUnitKind::BoilerValve, "b1".into(), 1, 1);
        entry.detach();
        assert_eq!(entry.hw_state, HwState::Offline);
        assert_eq!(entry.kind, RtuUnitKind::Virtual);
        let err = entry.attach(RtuUnitKind::TurbineValve, RtuUnitKind::BoilerValve);
        assert!(err.is_err());
    }

    #[test]
    fn formed_poll_transitions_unformed_to_ok_once() {
        let mut entry = RtuUnitEntry::new(1, RtuUnitKind::Imatrix, "ind1".into(), 1, 0);
        assert_eq!(entry.hw_state, HwState::Unformed);
        assert!(!entry.poll_formed(false));
        assert!(entry.poll_formed(true));
        assert_eq!(entry.hw_state, HwState::Ok);
        assert!(!entry.poll_formed(true));
    }
}
