// src/core/session/mod.rs

//! Per-peer session lifecycle (spec.md §3 "Session", §4.2-§4.4). A session
//! is created on a valid link/establish request, marked linked once its
//! handshake completes, and torn down on watchdog expiry or explicit close.
//!
//! Mirrors the teacher's `ClientMap: DashMap<u64, ClientInfo>` plus a
//! per-connection `ConnectionGuard` for RAII cleanup, generalized to four
//! session kinds instead of one client kind.

pub mod coord;
pub mod plc;
pub mod pocket;
pub mod registry;
pub mod rtu;
pub mod watchdog;

use crate::core::protocol::frame::ProtocolTag;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

/// One decoded-protocol-family payload delivered to a session's inbox. A
/// session kind can receive more than one protocol family from the same
/// peer (an RTU sends both `SCADA_MGMT` and `MODBUS` frames), so the tag
/// travels with the bytes rather than being inferred from the session kind
/// alone.
#[derive(Debug, Clone)]
pub struct InboxMessage {
    pub protocol: ProtocolTag,
    pub payload: Vec<u8>,
}

pub use coord::CoordSession;
pub use plc::PlcSession;
pub use pocket::PocketSession;
pub use registry::{CloseInfo, COMMS_VERSION, LinkOutcome, SessionHandle, SessionRegistry};
pub use rtu::{RtuSession, RtuUnitEntry};
pub use watchdog::Watchdog;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKindTag {
    Plc,
    Rtu,
    Coord,
    Pocket,
}

impl SessionKindTag {
    /// The metric-label spelling used by every `GaugeVec`/`CounterVec` in
    /// [`crate::core::metrics`] keyed by session kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKindTag::Plc => "plc",
            SessionKindTag::Rtu => "rtu",
            SessionKindTag::Coord => "coord",
            SessionKindTag::Pocket => "pocket",
        }
    }
}

/// Common fields every session kind carries, grounded on the teacher's
/// `ClientInfo` (remote address, last-activity clock, sequence counters).
/// Each session owns its inbox queue (spec.md §3 "Session"): packets from
/// one peer are delivered to that peer's inbox in arrival order, and
/// nothing else is required for the ordering guarantee in SPEC_FULL §5.
#[derive(Debug)]
pub struct SessionMeta {
    pub id: SessionId,
    pub remote_addr: SocketAddr,
    pub seq_rx: u32,
    pub seq_tx: u32,
    pub watchdog: Watchdog,
    pub linked: bool,
    pub version: u16,
    inbox_tx: mpsc::UnboundedSender<InboxMessage>,
    inbox_rx: Option<mpsc::UnboundedReceiver<InboxMessage>>,
}

impl SessionMeta {
    pub fn new(id: SessionId, remote_addr: SocketAddr, version: u16, timeout: Duration) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            id,
            remote_addr,
            seq_rx: 0,
            seq_tx: 0,
            watchdog: Watchdog::new(timeout),
            linked: false,
            version,
            inbox_tx,
            inbox_rx: Some(inbox_rx),
        }
    }

    pub fn next_tx_seq(&mut self) -> u32 {
        self.seq_tx = self.seq_tx.wrapping_add(1);
        self.seq_tx
    }

    /// Enqueues a decoded-protocol-family payload onto this session's
    /// inbox. Called by the connection router once a packet has passed
    /// frame verification (spec.md §4.2 "Routing").
    pub fn enqueue(&self, message: InboxMessage) -> Result<(), mpsc::error::SendError<InboxMessage>> {
        self.inbox_tx.send(message)
    }

    /// Hands ownership of the receiving half to the task that will drain
    /// this session's inbox. Only ever called once per session, by
    /// whichever task takes over servicing it after the handshake.
    pub fn take_inbox(&mut self) -> Option<mpsc::UnboundedReceiver<InboxMessage>> {
        self.inbox_rx.take()
    }
}

/// The tagged union of live session state, stored in the registry. A
/// trait-object-free enum per SPEC_FULL's data-model notes, rather than
/// `dyn Session` — each variant's behavior lives in its own module.
#[derive(Debug)]
pub enum SessionKind {
    Plc(PlcSession),
    Rtu(RtuSession),
    Coord(CoordSession),
    Pocket(PocketSession),
}

impl SessionKind {
    pub fn meta(&self) -> &SessionMeta {
        match self {
            SessionKind::Plc(s) => &s.meta,
            SessionKind::Rtu(s) => &s.meta,
            SessionKind::Coord(s) => &s.meta,
            SessionKind::Pocket(s) => &s.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut SessionMeta {
        match self {
            SessionKind::Plc(s) => &mut s.meta,
            SessionKind::Rtu(s) => &mut s.meta,
            SessionKind::Coord(s) => &mut s.meta,
            SessionKind::Pocket(s) => &mut s.meta,
        }
    }

    pub fn kind_tag(&self) -> SessionKindTag {
        match self {
            SessionKind::Plc(_) => SessionKindTag::Plc,
            SessionKind::Rtu(_) => SessionKindTag::Rtu,
            SessionKind::Coord(_) => SessionKindTag::Coord,
            SessionKind::Pocket(_) => SessionKindTag::Pocket,
        }
    }
}
