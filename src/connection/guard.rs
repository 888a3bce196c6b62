// src/connection/guard.rs

//! `SessionGuard`: an RAII guard for session resource cleanup, grounded on
//! the teacher's `ConnectionGuard`. A session's handshake attaches it to
//! the registry and (for PLCs) to the unit's back-reference; dropping the
//! guard without a hand-off tears both down, so a watchdog-timeout close
//! or a panicked service task can never leave a dangling registry entry or
//! a unit believing its PLC is still linked.

use crate::core::facility::FacilityState;
use crate::core::session::{SessionId, SessionKindTag, SessionRegistry};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    facility: Arc<Mutex<FacilityState>>,
    session_id: SessionId,
    kind: SessionKindTag,
    /// Set once the session has already been torn down through the normal
    /// path (explicit close, watchdog prune) so `Drop` doesn't double-close.
    handed_off: bool,
}

impl SessionGuard {
    pub fn new(
        registry: Arc<SessionRegistry>,
        facility: Arc<Mutex<FacilityState>>,
        session_id: SessionId,
        kind: SessionKindTag,
    ) -> Self {
        Self {
            registry,
            facility,
            session_id,
            kind,
            handed_off: false,
        }
    }

    /// Marks the session as already cleaned up elsewhere (e.g. the
    /// scheduler's watchdog scan already called `registry.close`), so this
    /// guard's `Drop` skips doing it again.
    pub fn set_handed_off(&mut self) {
        self.handed_off = true;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.handed_off {
            return;
        }
        let Some(close_info) = self.registry.close(self.session_id) else {
            return;
        };
        debug!(session_id = self.session_id, kind = ?self.kind, "session guard cleaning up");
        if let Some(reactor_id) = close_info.reactor_id {
            let facility = self.facility.clone();
            tokio::spawn(async move {
                let mut facility = facility.lock().await;
                if let Some(unit) = facility.unit_mut(reactor_id) {
                    unit.plc_unlinked();
                }
            });
        }
    }
}
