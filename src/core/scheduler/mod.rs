// src/core/scheduler/mod.rs

//! Scheduler & watchdogs (spec.md §4.9). A single 2 Hz tick clock drives
//! the facility update, session watchdog scans, and control-loop steps;
//! independent per-entity timers (the ~250ms `isFormed()` poll, burn-rate
//! resend cadence) are tracked through a dispatch table keyed by timer id
//! so nested timers coexist without spawning one OS timer each, matching
//! the teacher's single `time::interval`-driven `MasterMonitor::run_tick_loop`
//! shape (SPEC_FULL §4.9).

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TICK_HZ: f64 = 2.0;

/// Builds the `tokio::time::interval` the main scheduler loop selects on.
pub fn tick_interval(hz: f64) -> tokio::time::Interval {
    tokio::time::interval(Duration::from_secs_f64(1.0 / hz))
}

/// A single timer's bookkeeping: a period and the next deadline it fires
/// at. Re-armed every time it fires so a caller only needs to poll once
/// per scheduler tick.
#[derive(Debug, Clone, Copy)]
struct TimerEntry {
    period: Duration,
    deadline: Instant,
}

/// A keyed table of independent, periodic timers (spec.md §4.9: "Timer
/// events use a dispatch table keyed by timer id so that nested timers
/// co-exist"). Cancelable and re-armable like a session watchdog, but
/// keyed so many unrelated timers (one per RTU unit entry's `isFormed()`
/// poll, one per PLC session's burn-rate resend) can share one scan.
#[derive(Debug, Default)]
pub struct TimerTable<K: Eq + std::hash::Hash + Copy> {
    timers: HashMap<K, TimerEntry>,
}

impl<K: Eq + std::hash::Hash + Copy> TimerTable<K> {
    pub fn new() -> Self {
        Self {
            timers: HashMap::new(),
        }
    }

    /// Registers (or re-registers) a periodic timer keyed by `id`, armed
    /// from `now`.
    pub fn register(&mut self, id: K, period: Duration, now: Instant) {
        self.timers.insert(
            id,
            TimerEntry {
                period,
                deadline: now + period,
            },
        );
    }

    pub fn cancel(&mut self, id: K) {
        self.timers.remove(&id);
    }

    pub fn contains(&self, id: K) -> bool {
        self.timers.contains_key(&id)
    }

    /// Returns every timer id whose deadline has passed as of `now`,
    /// re-arming each one for its next period (so a fired timer appears at
    /// most once per call even if more than one period has elapsed).
    pub fn poll_expired(&mut self, now: Instant) -> Vec<K> {
        let mut fired = Vec::new();
        for (id, entry) in self.timers.iter_mut() {
            if now >= entry.deadline {
                fired.push(*id);
                entry.deadline = now + entry.period;
            }
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn a_registered_timer_fires_once_its_period_elapses() {
        let mut table: TimerTable<u32> = TimerTable::new();
        table.register(1, Duration::from_millis(250), Instant::now());
        assert!(table.poll_expired(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_millis(260)).await;
        assert_eq!(table.poll_expired(Instant::now()), vec![1]);
        // Re-armed: doesn't fire again immediately.
        assert!(table.poll_expired(Instant::now()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_a_timer_stops_it_from_firing() {
        let mut table: TimerTable<u32> = TimerTable::new();
        table.register(1, Duration::from_millis(100), Instant::now());
        table.cancel(1);
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(table.poll_expired(Instant::now()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn nested_timers_with_different_periods_coexist() {
        let mut table: TimerTable<&'static str> = TimerTable::new();
        let now = Instant::now();
        table.register("fast", Duration::from_millis(100), now);
        table.register("slow", Duration::from_millis(500), now);

        tokio::time::advance(Duration::from_millis(150)).await;
        let fired = table.poll_expired(Instant::now());
        assert_eq!(fired, vec!["fast"]);

        tokio::time::advance(Duration::from_millis(400)).await;
        let mut fired = table.poll_expired(Instant::now());
        fired.sort();
        assert_eq!(fired, vec!["fast", "slow"]);
    }
}
