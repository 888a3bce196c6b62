// src/core/session/watchdog.rs

//! Per-session liveness timer (spec.md §4.9). Checked against `now` at
//! each 2 Hz tick rather than backed by its own OS timer, matching
//! SPEC_FULL's note about keeping tick semantics identical to the
//! teacher's `MasterMonitor::run_tick_loop` shape.

use tokio::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Re-arms the deadline. Called on every valid inbound packet.
    pub fn feed(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    /// Cancels the watchdog, e.g. during a deliberate teardown where a
    /// timeout firing afterward would be meaningless.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Returns true if the watchdog is armed and its deadline has passed.
    pub fn expired(&self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_after_timeout_elapses() {
        let mut wd = Watchdog::new(Duration::from_secs(5));
        assert!(!wd.expired(Instant::now()));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(wd.expired(Instant::now()));
        wd.feed();
        assert!(!wd.expired(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_watchdog_never_expires() {
        let mut wd = Watchdog::new(Duration::from_secs(1));
        wd.cancel();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!wd.expired(Instant::now()));
    }
}
