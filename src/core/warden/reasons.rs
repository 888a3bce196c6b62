// src/core/warden/reasons.rs

//! The six auto-SCRAM trip conditions (spec.md §4.6), checked in fixed
//! order so the first match always wins. `evaluate` is a pure function
//! over a snapshot of facility state — no I/O, no mutation, so the
//! supervisor worker can call it every tick without side effects of its
//! own (those live in [`super::supervisor::SafetySupervisor`]).

use crate::core::facility::{FacilityMode, FacilityState};

/// Charge percentage (0..100) at or above which the induction matrix is
/// considered full (spec.md §4.6 "MATRIX_FILL").
pub const MATRIX_FILL_THRESHOLD: f64 = 99.0;

/// Radiation reading above which any environment detector trips the
/// facility (spec.md §4.6 "RADIATION"). Units follow the environment
/// detector's own telemetry scale; the core treats this as an opaque
/// threshold supplied by configuration in a full deployment.
pub const RADIATION_TRIP_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramReason {
    MatrixDc,
    MatrixFill,
    CritAlarm,
    Radiation,
    GenFault,
}

impl ScramReason {
    /// The localization-table key for this reason's operator-facing
    /// status string (spec.md §4.6, Design Notes §9 "Localization").
    pub fn status_key(&self) -> &'static str {
        match self {
            ScramReason::MatrixDc => "ascram.matrix_dc",
            ScramReason::MatrixFill => "ascram.matrix_fill",
            ScramReason::CritAlarm => "ascram.crit_alarm",
            ScramReason::Radiation => "ascram.radiation",
            ScramReason::GenFault => "ascram.gen_fault",
        }
    }
}

/// Evaluates every trip condition in spec.md §4.6's fixed order and
/// returns the first that matches, or `None` if the facility is safe.
pub fn evaluate(facility: &FacilityState) -> Option<ScramReason> {
    if facility.mode != FacilityMode::Inactive && facility.rtu_sessions_by_kind.induction.is_none() {
        return Some(ScramReason::MatrixDc);
    }
    if facility.avg_charge >= MATRIX_FILL_THRESHOLD {
        return Some(ScramReason::MatrixFill);
    }
    if facility.units.iter().any(|u| u.has_critical_alarm()) {
        return Some(ScramReason::CritAlarm);
    }
    if facility.max_envd_radiation > RADIATION_TRIP_THRESHOLD {
        return Some(ScramReason::Radiation);
    }
    if facility.mode == FacilityMode::GenRate && facility.control.saturated && facility.avg_net <= 0.0 {
        return Some(ScramReason::GenFault);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alarm::AlarmEvent;
    use crate::core::facility::Unit;

    fn facility() -> FacilityState {
        let units = vec![Unit::new(1, 1, 1)];
        let mut f = FacilityState::new(1, units, 0, vec![0]);
        f.rtu_sessions_by_kind.induction = Some(1);
        f
    }

    #[test]
    fn matrix_dc_trips_only_while_a_mode_is_active() {
        let mut f = facility();
        f.rtu_sessions_by_kind.induction = None;
        assert_eq!(evaluate(&f), None);
        f.mode = FacilityMode::Monitored;
        assert_eq!(evaluate(&f), Some(ScramReason::MatrixDc));
    }

    #[test]
    fn matrix_fill_trips_at_threshold() {
        let mut f = facility();
        f.avg_charge = 99.0;
        assert_eq!(evaluate(&f), Some(ScramReason::MatrixFill));
    }

    #[test]
    fn critical_alarm_outranks_matrix_fill() {
        let mut f = facility();
        f.avg_charge = 50.0;
        f.units[0].annunciators[0].latch(AlarmEvent::Trip);
        assert_eq!(evaluate(&f), Some(ScramReason::CritAlarm));
    }

    #[test]
    fn radiation_trips_above_threshold() {
        let mut f = facility();
        f.max_envd_radiation = RADIATION_TRIP_THRESHOLD + 0.1;
        assert_eq!(evaluate(&f), Some(ScramReason::Radiation));
    }

    /// spec.md §8 scenario S5.
    #[test]
    fn gen_fault_trips_when_gen_rate_saturates_with_no_net_output() {
        let mut f = facility();
        f.mode = FacilityMode::GenRate;
        f.control.saturated = true;
        f.avg_net = 0.0;
        assert_eq!(evaluate(&f), Some(ScramReason::GenFault));
    }

    #[test]
    fn a_safe_facility_trips_nothing() {
        let f = facility();
        assert_eq!(evaluate(&f), None);
    }
}
