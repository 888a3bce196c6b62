// src/core/alarm/mod.rs

//! Per-unit alarm annunciation (spec.md §3 "Unit", §4.8). Each unit runs 16
//! independent annunciator state machines; each latches to one of the
//! standard four alarm-annunciator states.

pub mod tones;

pub use tones::ToneMixer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    /// Condition clear, acknowledged (the rest state).
    Inactive,
    /// Condition active, not yet acknowledged.
    Tripped,
    /// Condition active, acknowledged.
    Acked,
    /// Condition cleared while still unacknowledged.
    RingBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmEvent {
    Trip,
    Clear,
    Ack,
}

/// One of a unit's 16 annunciator channels. `latch` applies the standard
/// annunciator discipline: a condition that clears before acknowledgment
/// rings back until acknowledged, rather than silently returning to
/// `Inactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annunciator {
    state: AlarmState,
}

impl Default for Annunciator {
    fn default() -> Self {
        Self {
            state: AlarmState::Inactive,
        }
    }
}

impl Annunciator {
    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, AlarmState::Tripped | AlarmState::RingBack)
    }

    pub fn latch(&mut self, event: AlarmEvent) -> AlarmState {
        self.state = match (self.state, event) {
            (AlarmState::Inactive, AlarmEvent::Trip) => AlarmState::Tripped,
            (AlarmState::Tripped, AlarmEvent::Ack) => AlarmState::Acked,
            (AlarmState::Tripped, AlarmEvent::Clear) => AlarmState::RingBack,
            (AlarmState::Acked, AlarmEvent::Clear) => AlarmState::Inactive,
            (AlarmState::Acked, AlarmEvent::Trip) => AlarmState::Acked,
            (AlarmState::RingBack, AlarmEvent::Ack) => AlarmState::Inactive,
            (AlarmState::RingBack, AlarmEvent::Trip) => AlarmState::Tripped,
            (unchanged, _) => unchanged,
        };
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_clearing_before_ack_rings_back_rather_than_going_inactive() {
        let mut a = Annunciator::default();
        assert_eq!(a.latch(AlarmEvent::Trip), AlarmState::Tripped);
        assert_eq!(a.latch(AlarmEvent::Clear), AlarmState::RingBack);
        assert!(a.is_active());
        assert_eq!(a.latch(AlarmEvent::Ack), AlarmState::Inactive);
        assert!(!a.is_active());
    }

    #[test]
    fn acked_alarm_returns_to_inactive_on_clear() {
        let mut a = Annunciator::default();
        a.latch(AlarmEvent::Trip);
        a.latch(AlarmEvent::Ack);
        assert_eq!(a.latch(AlarmEvent::Clear), AlarmState::Inactive);
    }

    #[test]
    fn re_trip_while_ringing_back_returns_to_tripped() {
        let mut a = Annunciator::default();
        a.latch(AlarmEvent::Trip);
        a.latch(AlarmEvent::Clear);
        assert_eq!(a.latch(AlarmEvent::Trip), AlarmState::Tripped);
    }
}
