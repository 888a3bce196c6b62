// src/core/warden/supervisor.rs

//! The stateful half of auto-SCRAM: holds the one-shot "already broadcast"
//! latch so evaluating [`super::reasons::evaluate`] twice with unchanged
//! inputs issues at most one `scram_all` (spec.md §8 Testable Property 6),
//! and carries out the trip itself — `mode -> Inactive`, `ascram = true`,
//! one broadcast to every linked PLC.
//!
//! Grounded on the teacher's `warden::failover` module: both watch a piece
//! of monitored state, decide when to act, and hold a latch so a repeated
//! observation of the same bad state doesn't repeat the action.

use super::reasons::{ScramReason, evaluate};
use crate::core::facility::{FacilityMode, FacilityState};

/// The supervisor's one external effect: broadcast an unconditional SCRAM
/// to every linked PLC (spec.md §4.6). A trait so the facility-owner task
/// can be driven by a fake in tests, the same way [`crate::core::peripheral::ToneSink`]
/// decouples the alarm mixer from the real tone renderer.
pub trait ScramSink {
    fn scram_all(&self, reason: ScramReason);
}

#[derive(Debug, Default)]
pub struct SafetySupervisor {
    /// The reason currently latched as "already broadcast". Cleared by
    /// [`FacilityState::ack_scram`] once the operator acknowledges and the
    /// facility leaves the tripped state.
    broadcast_latch: Option<ScramReason>,
}

impl SafetySupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one evaluation pass. If a trip condition is active and wasn't
    /// already latched, trips the facility (`mode -> Inactive`, `ascram =
    /// true`, `ascram_reason = reason`) and fires exactly one `scram_all`.
    /// Returns the reason if this call caused a new trip, `None` otherwise
    /// (already-tripped-and-latched, or nothing to trip).
    pub fn evaluate_and_maybe_trip(
        &mut self,
        facility: &mut FacilityState,
        sink: &dyn ScramSink,
    ) -> Option<ScramReason> {
        let reason = evaluate(facility)?;
        if self.broadcast_latch == Some(reason) {
            return None;
        }
        facility.mode = FacilityMode::Inactive;
        facility.ascram = true;
        facility.ascram_reason = Some(reason);
        facility.control.deactivate();
        self.broadcast_latch = Some(reason);
        sink.scram_all(reason);
        Some(reason)
    }

    /// Clears the latch once the operator acknowledges (spec.md §4.6 "On
    /// clear: operator must acknowledge and re-issue auto_start"). Call
    /// alongside [`FacilityState::ack_scram`].
    pub fn ack(&mut self) {
        self.broadcast_latch = None;
    }

    pub fn is_latched(&self) -> bool {
        self.broadcast_latch.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::facility::Unit;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(AtomicUsize);

    impl ScramSink for CountingSink {
        fn scram_all(&self, _reason: ScramReason) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn facility() -> FacilityState {
        let units = vec![Unit::new(1, 1, 1)];
        let mut f = FacilityState::new(1, units, 0, vec![0]);
        f.avg_charge = 100.0;
        f
    }

    /// spec.md §8 Testable Property 6.
    #[test]
    fn repeated_evaluation_with_unchanged_inputs_broadcasts_at_most_once() {
        let mut facility = facility();
        let mut supervisor = SafetySupervisor::new();
        let sink = CountingSink(AtomicUsize::new(0));

        let first = supervisor.evaluate_and_maybe_trip(&mut facility, &sink);
        assert_eq!(first, Some(ScramReason::MatrixFill));
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);

        let second = supervisor.evaluate_and_maybe_trip(&mut facility, &sink);
        assert_eq!(second, None);
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn acknowledging_and_re_tripping_broadcasts_again() {
        let mut facility = facility();
        let mut supervisor = SafetySupervisor::new();
        let sink = CountingSink(AtomicUsize::new(0));

        supervisor.evaluate_and_maybe_trip(&mut facility, &sink);
        facility.ack_scram();
        supervisor.ack();
        // Condition is still present (avg_charge untouched): re-evaluating
        // after an explicit ack is a fresh trip, not a repeat.
        let retrip = supervisor.evaluate_and_maybe_trip(&mut facility, &sink);
        assert_eq!(retrip, Some(ScramReason::MatrixFill));
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn a_safe_facility_never_trips() {
        let mut facility = facility();
        facility.avg_charge = 0.0;
        let mut supervisor = SafetySupervisor::new();
        let sink = CountingSink(AtomicUsize::new(0));
        assert_eq!(supervisor.evaluate_and_maybe_trip(&mut facility, &sink), None);
        assert!(!facility.ascram);
    }
}
