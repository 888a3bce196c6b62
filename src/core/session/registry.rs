// src/core/session/registry.rs

//! Process-wide session registry (spec.md §4.2). Mirrors the teacher's
//! `ClientMap: DashMap<u64, ClientInfo>` — sessions are looked up by id for
//! routing and by `(kind, addr)` for handshake dedup, with a secondary
//! index by reactor id so PLC collision checks are O(1).

use super::{CoordSession, PlcSession, PocketSession, RtuSession, RtuUnitEntry, SessionId, SessionKind, SessionKindTag};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub type SessionHandle = Arc<Mutex<SessionKind>>;

/// The handshake version every peer is expected to advertise (spec.md §4.1
/// "LINK_REQ"/"Establish"). A mismatch is rejected before any other check.
pub const COMMS_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Allowed(SessionId),
    Collision,
    BadVersion,
}

#[derive(Debug, Clone, Copy)]
pub struct CloseInfo {
    pub id: SessionId,
    pub kind_tag: SessionKindTag,
    pub reactor_id: Option<u32>,
}

pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
    by_addr: DashMap<(SessionKindTag, SocketAddr), SessionId>,
    plc_by_reactor: DashMap<u32, SessionId>,
    next_id: AtomicU64,
    comms_version: u16,
}

impl SessionRegistry {
    pub fn new(comms_version: u16) -> Self {
        Self {
            sessions: DashMap::new(),
            by_addr: DashMap::new(),
            plc_by_reactor: DashMap::new(),
            next_id: AtomicU64::new(1),
            comms_version,
        }
    }

    fn alloc_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn find(&self, kind: SessionKindTag, addr: SocketAddr) -> Option<SessionHandle> {
        let id = *self.by_addr.get(&(kind, addr))?;
        self.sessions.get(&id).map(|e| e.value().clone())
    }

    pub fn find_by_id(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.get(&id).map(|e| e.value().clone())
    }

    pub fn find_plc_by_reactor(&self, reactor_id: u32) -> Option<SessionHandle> {
        let id = *self.plc_by_reactor.get(&reactor_id)?;
        self.sessions.get(&id).map(|e| e.value().clone())
    }

    /// `LINK_REQ{version, reactor_id, role}` handshake (spec.md §4.3). A
    /// second request for a reactor id that already has a live session
    /// returns `Collision` and does not replace it (Testable Property 1).
    pub fn establish_plc(&self, addr: SocketAddr, reactor_id: u32, peer_version: u16, timeout: Duration) -> LinkOutcome {
        if peer_version != self.comms_version {
            return LinkOutcome::BadVersion;
        }
        if self.plc_by_reactor.contains_key(&reactor_id) {
            return LinkOutcome::Collision;
        }
        let id = self.alloc_id();
        let mut session = PlcSession::new(id, addr, reactor_id, peer_version, timeout);
        session.meta.linked = true;
        self.sessions.insert(id, Arc::new(Mutex::new(SessionKind::Plc(session))));
        self.by_addr.insert((SessionKindTag::Plc, addr), id);
        self.plc_by_reactor.insert(reactor_id, id);
        LinkOutcome::Allowed(id)
    }

    pub fn establish_rtu(&self, addr: SocketAddr, peer_version: u16, timeout: Duration, accepted_units: Vec<RtuUnitEntry>) -> LinkOutcome {
        if peer_version != self.comms_version {
            return LinkOutcome::BadVersion;
        }
        let id = self.alloc_id();
        let mut session = RtuSession::new(id, addr, peer_version, timeout);
        session.meta.linked = true;
        session.units = accepted_units;
        self.sessions.insert(id, Arc::new(Mutex::new(SessionKind::Rtu(session))));
        self.by_addr.insert((SessionKindTag::Rtu, addr), id);
        LinkOutcome::Allowed(id)
    }

    pub fn establish_coord(&self, addr: SocketAddr, peer_version: u16, timeout: Duration) -> LinkOutcome {
        if peer_version != self.comms_version {
            return LinkOutcome::BadVersion;
        }
        let id = self.alloc_id();
        let mut session = CoordSession::new(id, addr, peer_version, timeout);
        session.meta.linked = true;
        self.sessions.insert(id, Arc::new(Mutex::new(SessionKind::Coord(session))));
        self.by_addr.insert((SessionKindTag::Coord, addr), id);
        LinkOutcome::Allowed(id)
    }

    pub fn establish_pocket(&self, addr: SocketAddr, peer_version: u16, timeout: Duration) -> LinkOutcome {
        if peer_version != self.comms_version {
            return LinkOutcome::BadVersion;
        }
        let id = self.alloc_id();
        let mut session = PocketSession::new(id, addr, peer_version, timeout);
        session.meta.linked = true;
        self.sessions.insert(id, Arc::new(Mutex::new(SessionKind::Pocket(session))));
        self.by_addr.insert((SessionKindTag::Pocket, addr), id);
        LinkOutcome::Allowed(id)
    }

    /// Explicit close: drops the session and detaches its indexes. Returns
    /// the reactor id of a closed PLC session, if any, so the caller can
    /// clear the unit's PLC back-reference (spec.md §3 "resources ... are
    /// detached").
    pub fn close(&self, id: SessionId) -> Option<CloseInfo> {
        let (_, handle) = self.sessions.remove(&id)?;
        let session = handle.lock();
        let addr = session.meta().remote_addr;
        let kind_tag = session.kind_tag();
        let reactor_id = match &*session {
            SessionKind::Plc(plc) => Some(plc.reactor_id),
            _ => None,
        };
        drop(session);
        self.by_addr.remove(&(kind_tag, addr));
        if let Some(reactor_id) = reactor_id {
            self.plc_by_reactor.remove(&reactor_id);
        }
        Some(CloseInfo { id, kind_tag, reactor_id })
    }

    /// Scans all sessions, pruning any whose watchdog has fired. Returns
    /// the close info of every session removed this tick (spec.md §4.2, §8
    /// Testable Property 5), so the caller can react to a watchdog-expired
    /// PLC the same way it would an explicit close (e.g. clearing the
    /// owning unit's PLC back-reference). Never blocks: removal is a map
    /// operation, no I/O is performed here.
    pub fn tick(&self, now: Instant) -> Vec<CloseInfo> {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|e| e.value().lock().meta().watchdog.expired(now))
            .map(|e| *e.key())
            .collect();
        expired.into_iter().filter_map(|id| self.close(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Every currently-live session id of the given kind, for fan-out pushes
    /// like the periodic `FAC_STATUS`/`UNIT_STATUS` broadcast to every
    /// linked coordinator and pocket (spec.md §4.5).
    pub fn ids_by_kind(&self, kind: SessionKindTag) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|e| e.value().lock().kind_tag() == kind)
            .map(|e| *e.key())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn second_link_req_for_same_reactor_is_a_collision() {
        let registry = SessionRegistry::new(1);
        let first = registry.establish_plc(addr(1), 1, 1, Duration::from_secs(5));
        assert!(matches!(first, LinkOutcome::Allowed(_)));
        let second = registry.establish_plc(addr(2), 1, 1, Duration::from_secs(5));
        assert_eq!(second, LinkOutcome::Collision);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn version_mismatch_is_rejected_before_collision_check() {
        let registry = SessionRegistry::new(2);
        let outcome = registry.establish_plc(addr(1), 1, 1, Duration::from_secs(5));
        assert_eq!(outcome, LinkOutcome::BadVersion);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_timeout_prunes_session_at_next_tick() {
        let registry = SessionRegistry::new(1);
        registry.establish_plc(addr(1), 1, 1, Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(200)).await;
        let expired = registry.tick(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(registry.len(), 0);
        assert!(registry.find_plc_by_reactor(1).is_none());
    }

    #[test]
    fn closing_a_plc_session_frees_its_reactor_id_for_reuse() {
        let registry = SessionRegistry::new(1);
        let id = match registry.establish_plc(addr(1), 1, 1, Duration::from_secs(5)) {
            LinkOutcome::Allowed(id) => id,
            other => panic!("unexpected {other:?}"),
        };
        registry.close(id);
        let second = registry.establish_plc(addr(1), 1, 1, Duration::from_secs(5));
        assert!(matches!(second, LinkOutcome::Allowed(_)));
    }
}
