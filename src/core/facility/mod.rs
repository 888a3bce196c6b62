// src/core/facility/mod.rs

//! Facility-wide state and the per-unit model (spec.md §3 "Facility",
//! "Unit", §4.5 auto-control). This is the single source of truth the
//! facility-owner task holds exclusively (SPEC_FULL §3/§5) — every other
//! task reads through a cloned snapshot or a `watch` channel, never a
//! shared `&mut FacilityState` across an await point.

pub mod control;
pub mod tanks;

pub use control::{BurnAssignment, ControlLoop};

use crate::core::alarm::{AlarmState, Annunciator};
use crate::core::errors::ScadaError;
use crate::core::protocol::coord_data::AutoControlMode;
use crate::core::protocol::rplc::{ReactorTelemetry, RpsStatus, WasteMode};
use crate::core::session::SessionId;
use crate::core::warden::ScramReason;
use std::collections::BTreeMap;

pub const ALARM_COUNT: usize = 16;
pub const TONE_SLOT_COUNT: usize = 8;
pub const ALARM_TEST_COUNT: usize = 12;

/// Facility auto-control modes (spec.md §4.5). Ordinal order matters:
/// `auto_start` accepts any requested mode strictly greater than `Inactive`
/// and at most `GenRate`; `GenRateFaultIdle` is safety-only and never a
/// valid `auto_start` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum FacilityMode {
    Inactive = 0,
    Monitored = 1,
    BurnRate = 2,
    Charge = 3,
    GenRate = 4,
    GenRateFaultIdle = 5,
}

impl FacilityMode {
    /// The metric-label spelling for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityMode::Inactive => "inactive",
            FacilityMode::Monitored => "monitored",
            FacilityMode::BurnRate => "burn_rate",
            FacilityMode::Charge => "charge",
            FacilityMode::GenRate => "gen_rate",
            FacilityMode::GenRateFaultIdle => "gen_rate_fault_idle",
        }
    }

    /// The localization-table key for this mode's operator-facing status
    /// string (spec.md §4.5, Design Notes §9 "Localization"), mirroring
    /// [`crate::core::warden::ScramReason::status_key`].
    pub fn status_key(&self) -> &'static str {
        match self {
            FacilityMode::Inactive => "status.inactive",
            FacilityMode::Monitored => "status.monitored",
            FacilityMode::BurnRate => "status.burn_rate",
            FacilityMode::Charge => "status.charge",
            FacilityMode::GenRate => "status.gen_rate",
            FacilityMode::GenRateFaultIdle => "status.gen_rate_fault_idle",
        }
    }
}

impl From<AutoControlMode> for FacilityMode {
    fn from(m: AutoControlMode) -> Self {
        match m {
            AutoControlMode::Inactive => FacilityMode::Inactive,
            AutoControlMode::Monitored => FacilityMode::Monitored,
            AutoControlMode::BurnRate => FacilityMode::BurnRate,
            AutoControlMode::Charge => FacilityMode::Charge,
            AutoControlMode::GenRate => FacilityMode::GenRate,
        }
    }
}

impl From<FacilityMode> for AutoControlMode {
    /// `GenRateFaultIdle` has no wire counterpart — every auto-SCRAM reason
    /// forces `Inactive` (spec.md §4.5), so the supervisor never actually
    /// constructs this mode; it maps to `Inactive` for exhaustiveness only.
    fn from(m: FacilityMode) -> Self {
        match m {
            FacilityMode::Inactive | FacilityMode::GenRateFaultIdle => AutoControlMode::Inactive,
            FacilityMode::Monitored => AutoControlMode::Monitored,
            FacilityMode::BurnRate => AutoControlMode::BurnRate,
            FacilityMode::Charge => AutoControlMode::Charge,
            FacilityMode::GenRate => AutoControlMode::GenRate,
        }
    }
}

/// A validated `auto_start` request (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct AutoStartConfig {
    pub mode: AutoControlMode,
    pub burn_target: f64,
    pub charge_setpoint: f64,
    pub gen_rate_setpoint: f64,
    /// One entry per unit, `unit_count` long, applied unconditionally
    /// (persistent configuration, not mode-gated).
    pub limits: Vec<f64>,
}

/// Facility-held, typed projections of RTU-owned devices (spec.md §3
/// "Ownership"), kept for O(1) iteration instead of re-scanning every RTU
/// session's unit list each tick.
#[derive(Debug, Clone, Default)]
pub struct RtuProjections {
    pub induction: Option<SessionId>,
    pub sps: Option<SessionId>,
    pub tanks: Vec<SessionId>,
    pub envd: Vec<SessionId>,
    pub redstone: Vec<SessionId>,
}

/// Per-unit control state (spec.md §3 "Unit").
#[derive(Debug, Clone)]
pub struct Unit {
    pub id: u32,
    pub boilers: u8,
    pub turbines: u8,
    /// Non-owning handle into the session registry (spec.md §3
    /// "Ownership": "a unit has a non-owning weak reference to its PLC
    /// session"). `None` when no PLC is linked.
    pub plc_session: Option<SessionId>,
    pub rtu_sessions: Vec<SessionId>,
    pub linked_boilers: u8,
    pub linked_turbines: u8,
    pub boilers_faulted: bool,
    pub turbines_faulted: bool,
    pub burn_limit_100: u32,
    pub requested_burn_100: u32,
    pub burn_target_100: u32,
    pub auto_waste: bool,
    /// Priority group: 0 = independent (excluded from auto control), 1..4
    /// ranked participation order.
    pub group: u8,
    pub rps_mirror: RpsStatus,
    pub annunciators: [Annunciator; ALARM_COUNT],
    pub db: ReactorTelemetry,
    pub tank_defs: [u8; 4],
}

impl Unit {
    pub fn new(id: u32, boilers: u8, turbines: u8) -> Self {
        Self {
            id,
            boilers,
            turbines,
            plc_session: None,
            rtu_sessions: Vec::new(),
            linked_boilers: 0,
            linked_turbines: 0,
            boilers_faulted: false,
            turbines_faulted: false,
            burn_limit_100: 0,
            requested_burn_100: 0,
            burn_target_100: 0,
            auto_waste: true,
            group: 0,
            rps_mirror: RpsStatus {
                tripped: false,
                force_disabled: false,
                trip_causes: 0,
            },
            annunciators: [Annunciator::default(); ALARM_COUNT],
            db: ReactorTelemetry::default(),
            tank_defs: [0; 4],
        }
    }

    /// A unit is ready iff its PLC is linked and every required boiler and
    /// turbine is linked and unfaulted (spec.md §3 "Unit" invariant).
    pub fn ready(&self) -> bool {
        self.plc_session.is_some()
            && self.linked_boilers >= self.boilers
            && self.linked_turbines >= self.turbines
            && !self.boilers_faulted
            && !self.turbines_faulted
    }

    pub fn plc_unlinked(&mut self) {
        self.plc_session = None;
    }

    /// Any critical-severity alarm currently tripped or ringing back. The
    /// two lowest-indexed annunciators are reserved for the critical band
    /// (high temperature, high damage), matching the tone mixer's severity
    /// banding in [`crate::core::alarm::tones`].
    pub fn has_critical_alarm(&self) -> bool {
        self.annunciators[0..2].iter().any(|a| a.is_active())
    }

    /// Waste routing (spec.md §2 "waste routing"): when `auto_waste` is
    /// set, pick a waste disposal mode from the reactor's current waste
    /// fill level rather than trusting the operator's last manual choice.
    pub fn route_waste(&self) -> WasteMode {
        if !self.auto_waste {
            return WasteMode::Manual;
        }
        if self.db.waste_fill_percent >= 90.0 {
            WasteMode::AntimatterPlacement
        } else {
            WasteMode::Auto
        }
    }
}

/// Facility-wide state (spec.md §3 "Facility"). Owned exclusively by the
/// facility-update task.
#[derive(Debug, Clone)]
pub struct FacilityState {
    pub unit_count: u8,
    pub tank_mode: u8,
    pub tank_defs: Vec<u8>,
    /// Solved facility-wide tank topology (spec.md §4.7), recomputed
    /// whenever `tank_defs`/`tank_mode` change.
    pub tank_list: [u8; 4],
    /// `groups[g]` lists unit ids in priority group `g+1` (1..4), ascending
    /// by id — group 0 (independent) is never stored here.
    pub groups: [Vec<u32>; 4],
    pub mode: FacilityMode,
    pub status_text: [String; 3],
    pub tones: [bool; TONE_SLOT_COUNT],
    pub alarm_tests: [bool; ALARM_TEST_COUNT],
    pub ascram: bool,
    pub ascram_reason: Option<ScramReason>,
    pub charge_setpoint: f64,
    pub gen_rate_setpoint: f64,
    pub burn_target: f64,
    pub avg_charge: f64,
    pub avg_inflow: f64,
    pub avg_outflow: f64,
    pub avg_net: f64,
    pub imtx_last_charge: f64,
    pub imtx_last_charge_t: u64,
    /// Highest environment-detector radiation reading facility-wide, fed by
    /// RTU telemetry. Compared against
    /// [`crate::core::warden::RADIATION_TRIP_THRESHOLD`] by the safety
    /// supervisor (spec.md §4.6 "RADIATION").
    pub max_envd_radiation: f64,
    pub rtu_sessions_by_kind: RtuProjections,
    pub units: Vec<Unit>,
    pub control: ControlLoop,
}

impl FacilityState {
    pub fn new(unit_count: u8, units: Vec<Unit>, tank_mode: u8, tank_defs: Vec<u8>) -> Self {
        let mut facility = Self {
            unit_count,
            tank_mode,
            tank_defs,
            tank_list: [0; 4],
            groups: Default::default(),
            mode: FacilityMode::Inactive,
            status_text: [String::new(), String::new(), String::new()],
            tones: [false; TONE_SLOT_COUNT],
            alarm_tests: [false; ALARM_TEST_COUNT],
            ascram: false,
            ascram_reason: None,
            charge_setpoint: 0.0,
            gen_rate_setpoint: 0.0,
            burn_target: 0.0,
            avg_charge: 0.0,
            avg_inflow: 0.0,
            avg_outflow: 0.0,
            avg_net: 0.0,
            imtx_last_charge: 0.0,
            imtx_last_charge_t: 0,
            max_envd_radiation: 0.0,
            rtu_sessions_by_kind: RtuProjections::default(),
            units,
            control: ControlLoop::new(0.5, 0.05, 0.01, -1_000_000.0, 1_000_000.0),
        };
        facility.recompute_tank_topology();
        facility
    }

    pub fn unit_mut(&mut self, id: u32) -> Option<&mut Unit> {
        self.units.iter_mut().find(|u| u.id == id)
    }

    pub fn unit(&self, id: u32) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == id)
    }

    /// Recomputes the facility-wide solved tank topology (spec.md §4.7).
    /// Called whenever `tank_mode`/`tank_defs` change; mode is frozen
    /// otherwise. `tank_defs` holds one entry per unit; the solver always
    /// works over four slots, so the defs are padded with `0` (no tank) up
    /// to length 4.
    pub fn recompute_tank_topology(&mut self) {
        let mut defs = [0u8; 4];
        for (slot, &d) in defs.iter_mut().zip(self.tank_defs.iter()) {
            *slot = d;
        }
        self.tank_list = tanks::solve(self.tank_mode, defs);
    }

    /// Assigns `unit_id` to `group` (0 = independent, 1..4 ranked). Only
    /// permitted while `mode == Inactive` (spec.md §3 "Facility" invariant:
    /// "when mode == INACTIVE, setpoints and group assignments are
    /// mutable, otherwise frozen").
    pub fn set_group(&mut self, unit_id: u32, group: u8) -> Result<(), ScadaError> {
        if self.mode != FacilityMode::Inactive {
            return Err(ScadaError::InvalidState(
                "group assignment is frozen while auto control is active".into(),
            ));
        }
        if group > 4 {
            return Err(ScadaError::InvalidState(format!("invalid group {group}")));
        }
        for bucket in &mut self.groups {
            bucket.retain(|&id| id != unit_id);
        }
        if let Some(unit) = self.unit_mut(unit_id) {
            unit.group = group;
        } else {
            return Err(ScadaError::UnknownUnit(unit_id));
        }
        if group > 0 {
            let bucket = &mut self.groups[group as usize - 1];
            bucket.push(unit_id);
            bucket.sort_unstable();
        }
        Ok(())
    }

    pub fn units_ready(&self) -> bool {
        self.units.iter().all(Unit::ready)
    }

    /// Validates and (if gating allows) activates an `auto_start` request
    /// exactly as spec.md §4.5 describes. Per-unit `limits` are applied
    /// unconditionally even if the mode doesn't advance.
    pub fn auto_start(&mut self, cfg: AutoStartConfig) -> Result<(), ScadaError> {
        let requested: FacilityMode = cfg.mode.into();
        if !(requested > FacilityMode::Inactive && requested <= FacilityMode::GenRate) {
            return Err(ScadaError::InvalidState(format!(
                "auto_start mode must be in (Inactive, GenRate], got {requested:?}"
            )));
        }
        if cfg.limits.len() != self.unit_count as usize {
            return Err(ScadaError::InvalidState(format!(
                "expected {} limits, got {}",
                self.unit_count,
                cfg.limits.len()
            )));
        }
        if cfg.limits.iter().any(|&l| l < 0.1) {
            return Err(ScadaError::InvalidState("every limit must be >= 0.1".into()));
        }
        let required_setpoint = match requested {
            FacilityMode::BurnRate => cfg.burn_target,
            FacilityMode::Charge => cfg.charge_setpoint,
            FacilityMode::GenRate => cfg.gen_rate_setpoint,
            _ => 0.0,
        };
        if requested == FacilityMode::BurnRate && cfg.burn_target < 0.1 {
            return Err(ScadaError::InvalidState("burn_target must be >= 0.1".into()));
        }
        if required_setpoint < 0.0 {
            return Err(ScadaError::InvalidState("setpoints must be non-negative".into()));
        }

        // Limits are persistent configuration: applied regardless of
        // whether the mode actually advances below.
        for (unit, &limit) in self.units.iter_mut().zip(cfg.limits.iter()) {
            unit.burn_limit_100 = (limit * 100.0).round() as u32;
        }

        self.charge_setpoint = cfg.charge_setpoint;
        self.gen_rate_setpoint = cfg.gen_rate_setpoint;
        self.burn_target = cfg.burn_target;

        if self.mode == FacilityMode::Inactive && self.units_ready() && required_setpoint > 0.0 {
            self.mode = requested;
            self.control.activate();
        }
        Ok(())
    }

    /// Operator `auto_stop` (spec.md §4.5): unconditional, always succeeds.
    pub fn auto_stop(&mut self) {
        self.mode = FacilityMode::Inactive;
        self.control.deactivate();
    }

    /// Operator acknowledgment of a latched auto-SCRAM, required before
    /// `auto_start` can be reissued (spec.md §4.6).
    pub fn ack_scram(&mut self) {
        self.ascram = false;
        self.ascram_reason = None;
    }

    /// One scheduler tick of the auto-control loop (spec.md §4.5). Steps
    /// the integrator (for `Charge`/`GenRate`), then distributes the
    /// commanded total burn across ready units — by priority group for
    /// every closed-loop mode, or flat by residual capacity for
    /// `BurnRate`. `Monitored` and `Inactive` never distribute. Each
    /// returned assignment also updates the owning unit's
    /// `burn_target_100` so status pushes stay consistent with what was
    /// commanded.
    pub fn step_control(&mut self, dt_secs: f64) -> Vec<BurnAssignment> {
        if !matches!(
            self.mode,
            FacilityMode::BurnRate | FacilityMode::Charge | FacilityMode::GenRate
        ) {
            return Vec::new();
        }

        let ready_ids: Vec<u32> = self.units.iter().filter(|u| u.ready()).map(|u| u.id).collect();
        let limits: BTreeMap<u32, f64> = self
            .units
            .iter()
            .filter(|u| ready_ids.contains(&u.id))
            .map(|u| (u.id, u.burn_limit_100 as f64 / 100.0))
            .collect();

        let assignments = match self.mode {
            FacilityMode::BurnRate => {
                let units: Vec<&Unit> = self.units.iter().filter(|u| ready_ids.contains(&u.id)).collect();
                control::distribute_burn_rate(self.burn_target, &units, &limits)
            }
            FacilityMode::Charge | FacilityMode::GenRate => {
                let measured = if self.mode == FacilityMode::Charge {
                    self.avg_charge
                } else {
                    self.avg_net
                };
                let setpoint = if self.mode == FacilityMode::Charge {
                    self.charge_setpoint
                } else {
                    self.gen_rate_setpoint
                };
                let cmd = self.control.step(setpoint, measured, dt_secs);
                self.control.update_ramp(cmd, measured);
                let current: BTreeMap<u32, f64> = self
                    .units
                    .iter()
                    .filter(|u| ready_ids.contains(&u.id))
                    .map(|u| (u.id, u.db.act_burn_rate_mb_t))
                    .collect();
                let units: Vec<&Unit> = self.units.iter().filter(|u| ready_ids.contains(&u.id)).collect();
                control::distribute_by_priority(cmd, &units, &limits, &current)
            }
            _ => unreachable!("gated above"),
        };

        for assignment in &assignments {
            if let Some(unit) = self.unit_mut(assignment.unit_id) {
                unit.burn_target_100 = (assignment.burn * 100.0).round() as u32;
            }
        }
        assignments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facility(unit_count: u8) -> FacilityState {
        let units = (1..=unit_count).map(|id| Unit::new(id, 1, 1)).collect();
        FacilityState::new(unit_count, units, 0, vec![1; unit_count as usize])
    }

    fn ready_unit(f: &mut FacilityState, id: u32) {
        let u = f.unit_mut(id).unwrap();
        u.plc_session = Some(1);
        u.linked_boilers = u.boilers;
        u.linked_turbines = u.turbines;
    }

    /// spec.md §8 scenario S1.
    #[test]
    fn s1_burn_rate_auto_start_activates_and_commands_target() {
        let mut f = facility(1);
        ready_unit(&mut f, 1);
        f.set_group(1, 1).unwrap();
        let cfg = AutoStartConfig {
            mode: AutoControlMode::BurnRate,
            burn_target: 5.0,
            charge_setpoint: 0.0,
            gen_rate_setpoint: 0.0,
            limits: vec![10.0],
        };
        f.auto_start(cfg).unwrap();
        assert_eq!(f.mode, FacilityMode::BurnRate);
        let assignments = control::distribute_burn_rate(
            f.burn_target,
            &f.units.iter().collect::<Vec<_>>(),
            &f.units.iter().map(|u| (u.id, u.burn_limit_100 as f64 / 100.0)).collect(),
        );
        assert_eq!(assignments.len(), 1);
        assert!((assignments[0].burn - 5.0).abs() < 1e-9);
    }

    /// spec.md §8 scenario S1, exercised through `step_control` rather than
    /// calling `distribute_burn_rate` directly.
    #[test]
    fn step_control_commands_the_full_burn_target_for_a_single_ready_unit() {
        let mut f = facility(1);
        ready_unit(&mut f, 1);
        f.set_group(1, 1).unwrap();
        f.auto_start(AutoStartConfig {
            mode: AutoControlMode::BurnRate,
            burn_target: 5.0,
            charge_setpoint: 0.0,
            gen_rate_setpoint: 0.0,
            limits: vec![10.0],
        })
        .unwrap();

        let assignments = f.step_control(0.5);
        assert_eq!(assignments.len(), 1);
        assert!((assignments[0].burn - 5.0).abs() < 1e-9);
        assert_eq!(f.unit(1).unwrap().burn_target_100, 500);
    }

    #[test]
    fn step_control_distributes_nothing_while_inactive() {
        let mut f = facility(1);
        ready_unit(&mut f, 1);
        assert!(f.step_control(0.5).is_empty());
    }

    #[test]
    fn auto_start_does_not_advance_mode_when_units_not_ready() {
        let mut f = facility(1);
        let cfg = AutoStartConfig {
            mode: AutoControlMode::BurnRate,
            burn_target: 5.0,
            charge_setpoint: 0.0,
            gen_rate_setpoint: 0.0,
            limits: vec![10.0],
        };
        f.auto_start(cfg).unwrap();
        assert_eq!(f.mode, FacilityMode::Inactive);
    }

    #[test]
    fn auto_start_rejects_mismatched_limits_length() {
        let mut f = facility(2);
        let cfg = AutoStartConfig {
            mode: AutoControlMode::BurnRate,
            burn_target: 5.0,
            charge_setpoint: 0.0,
            gen_rate_setpoint: 0.0,
            limits: vec![10.0],
        };
        assert!(f.auto_start(cfg).is_err());
    }

    #[test]
    fn limits_apply_even_when_mode_cannot_advance() {
        let mut f = facility(1);
        let cfg = AutoStartConfig {
            mode: AutoControlMode::BurnRate,
            burn_target: 5.0,
            charge_setpoint: 0.0,
            gen_rate_setpoint: 0.0,
            limits: vec![7.5],
        };
        f.auto_start(cfg).unwrap();
        assert_eq!(f.mode, FacilityMode::Inactive);
        assert_eq!(f.unit(1).unwrap().burn_limit_100, 750);
    }

    #[test]
    fn group_assignment_is_frozen_once_a_mode_is_active() {
        let mut f = facility(1);
        ready_unit(&mut f, 1);
        f.set_group(1, 1).unwrap();
        let cfg = AutoStartConfig {
            mode: AutoControlMode::BurnRate,
            burn_target: 5.0,
            charge_setpoint: 0.0,
            gen_rate_setpoint: 0.0,
            limits: vec![10.0],
        };
        f.auto_start(cfg).unwrap();
        assert!(f.set_group(1, 2).is_err());
    }

    #[test]
    fn unit_not_ready_when_a_boiler_is_unlinked() {
        let mut u = Unit::new(1, 2, 1);
        u.plc_session = Some(1);
        u.linked_boilers = 1;
        u.linked_turbines = 1;
        assert!(!u.ready());
    }

    #[test]
    fn waste_routes_to_antimatter_placement_above_threshold() {
        let mut u = Unit::new(1, 1, 1);
        u.db.waste_fill_percent = 95.0;
        assert_eq!(u.route_waste(), WasteMode::AntimatterPlacement);
    }
}
