// src/connection/router.rs

//! Inbound datagram routing (spec.md §4.2 "Routing"): decode the frame,
//! authenticate and de-duplicate it, then either hand it to an existing
//! session's inbox or — for the handful of packet shapes that open a
//! session — begin a handshake and spawn the task that services it.
//! Every other orphan packet is dropped and the sender is sent a `DENY`
//! hint so it re-links, per spec.md.

use crate::config::SupervisorConfig;
use crate::connection::dispatch;
use crate::connection::guard::SessionGuard;
use crate::core::errors::ScadaError;
use crate::core::facility::FacilityState;
use crate::core::metrics::{PACKETS_DECODED_TOTAL, PACKETS_DROPPED_TOTAL, SESSION_ESTABLISH_TOTAL};
use crate::core::protocol::frame::{Frame, decode_frame, encode_frame, verify_frame};
use crate::core::protocol::rplc::{LinkAckReason, PlcRole, RplcMessage};
use crate::core::protocol::scada_mgmt::{EstablishRole, ScadaMgmtMessage};
use crate::core::protocol::{Packet, ProtocolTag};
use crate::core::session::registry::LinkOutcome;
use crate::core::session::{InboxMessage, SessionHandle, SessionKindTag, SessionRegistry};
use crate::core::transport::{DatagramTransport, Inbound};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Everything the router and the per-session dispatch tasks it spawns need
/// a handle on. Bundled so `route_inbound` stays a single `&self`-shaped
/// argument and new sessions can be handed their own clone of every Arc
/// when they're spawned off as independent tasks.
pub struct RouterContext {
    pub registry: Arc<SessionRegistry>,
    pub facility: Arc<Mutex<FacilityState>>,
    pub transport: Arc<dyn DatagramTransport>,
    pub config: Arc<SupervisorConfig>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Sends a bare `SCADA_MGMT::Close`-shaped deny hint to `addr` so an orphan
/// sender re-links instead of silently retrying forever (spec.md §4.2).
async fn send_deny_hint(ctx: &RouterContext, addr: SocketAddr) {
    let Ok(payload) = ScadaMgmtMessage::Close.encode() else {
        return;
    };
    let frame = Frame {
        src_channel: ctx.config.svr_channel,
        dst_channel: addr.port(),
        protocol: ProtocolTag::ScadaMgmt,
        seq: 0,
        timestamp_ms: now_ms(),
        payload,
        mac: None,
    };
    let bytes = encode_frame(&frame, ctx.config.auth_key.as_deref().map(str::as_bytes));
    let _ = ctx.transport.send(addr, &bytes).await;
}

trait Encodable {
    fn encode(&self) -> Result<Vec<u8>, ScadaError>;
}
impl Encodable for ScadaMgmtMessage {
    fn encode(&self) -> Result<Vec<u8>, ScadaError> {
        crate::core::protocol::scada_mgmt::encode(self)
    }
}
impl Encodable for RplcMessage {
    fn encode(&self) -> Result<Vec<u8>, ScadaError> {
        crate::core::protocol::rplc::encode(self)
    }
}

/// Tries to find the session this inbound datagram belongs to, across
/// every kind tag (an `SCADA_MGMT` reply or keepalive can arrive from any
/// peer kind once established).
fn find_existing(registry: &SessionRegistry, addr: SocketAddr) -> Option<(SessionKindTag, SessionHandle)> {
    for kind in [
        SessionKindTag::Plc,
        SessionKindTag::Rtu,
        SessionKindTag::Coord,
        SessionKindTag::Pocket,
    ] {
        if let Some(handle) = registry.find(kind, addr) {
            return Some((kind, handle));
        }
    }
    None
}

/// Processes one inbound datagram against the session registry. Never
/// panics on malformed input: every failure path logs and drops, exactly
/// as spec.md §4.1/§4.2 require.
pub async fn route_inbound(ctx: &RouterContext, inbound: Inbound) {
    if ctx.config.trusted_range != 0 && inbound.distance > ctx.config.trusted_range {
        warn!(src = %inbound.src_addr, distance = inbound.distance, "dropping packet outside trusted range");
        PACKETS_DROPPED_TOTAL.with_label_values(&["trusted_range"]).inc();
        return;
    }

    let frame = match decode_frame(&inbound.payload) {
        Ok(f) => f,
        Err(e) => {
            debug!(src = %inbound.src_addr, error = %e, "dropped malformed frame");
            PACKETS_DROPPED_TOTAL.with_label_values(&["malformed_frame"]).inc();
            return;
        }
    };

    let existing = find_existing(&ctx.registry, inbound.src_addr);
    let last_seq = existing.as_ref().map(|(_, h)| h.lock().meta().seq_rx);

    if let Err(e) = verify_frame(
        &frame,
        ctx.config.auth_key.as_deref().map(str::as_bytes),
        last_seq,
        replay_window(),
        now_ms(),
        std::time::Duration::from_secs(30),
    ) {
        warn!(src = %inbound.src_addr, error = %e, "dropped unauthenticated/stale frame");
        PACKETS_DROPPED_TOTAL.with_label_values(&["auth_or_replay"]).inc();
        return;
    }

    let packet = match Packet::decode(frame.protocol, &frame.payload) {
        Ok(p) => p,
        Err(e) => {
            debug!(src = %inbound.src_addr, error = %e, "dropped undecodable payload");
            PACKETS_DROPPED_TOTAL.with_label_values(&["undecodable"]).inc();
            return;
        }
    };
    PACKETS_DECODED_TOTAL.with_label_values(&[frame.protocol.as_str()]).inc();

    if let Some((_, handle)) = &existing {
        let mut session = handle.lock();
        session.meta_mut().seq_rx = frame.seq.max(session.meta().seq_rx);
        session.meta_mut().watchdog.feed();
        drop(session);
        let message = InboxMessage {
            protocol: frame.protocol,
            payload: frame.payload.clone(),
        };
        if let Err(e) = handle.lock().meta().enqueue(message) {
            debug!(src = %inbound.src_addr, error = %e, "session inbox closed, dropping packet");
        }
        return;
    }

    // No existing session: only a handful of packet shapes may open one.
    match packet {
        Packet::Rplc(RplcMessage::LinkReq { version, reactor_id, role: PlcRole::Reactor }) => {
            handle_plc_link(ctx, inbound.src_addr, version, reactor_id).await;
        }
        Packet::ScadaMgmt(ScadaMgmtMessage::Establish { version, role }) => {
            handle_establish(ctx, inbound.src_addr, version, role).await;
        }
        _ => {
            debug!(src = %inbound.src_addr, "dropped orphan packet, sending deny hint");
            PACKETS_DROPPED_TOTAL.with_label_values(&["orphan"]).inc();
            send_deny_hint(ctx, inbound.src_addr).await;
        }
    }
}

fn replay_window() -> u32 {
    // A modest allowance for out-of-order datagram delivery without
    // accepting a true replay (spec.md §4.1).
    16
}

async fn handle_plc_link(ctx: &RouterContext, addr: SocketAddr, version: u16, reactor_id: u32) {
    let outcome = ctx.registry.establish_plc(addr, reactor_id, version, ctx.config.plc_timeout);
    let reason = match outcome {
        LinkOutcome::Allowed(session_id) => {
            let linked = {
                let mut facility = ctx.facility.lock().await;
                match facility.unit_mut(reactor_id) {
                    Some(unit) => {
                        unit.plc_session = Some(session_id);
                        true
                    }
                    None => false,
                }
            };
            if linked {
                spawn_session(ctx, session_id, SessionKindTag::Plc);
                LinkAckReason::Allow
            } else {
                // No such unit configured: tear the session back down
                // rather than leaving an orphaned registry entry no unit
                // will ever drain.
                ctx.registry.close(session_id);
                LinkAckReason::BadVersion
            }
        }
        LinkOutcome::Collision => LinkAckReason::Collision,
        LinkOutcome::BadVersion => LinkAckReason::BadVersion,
    };
    SESSION_ESTABLISH_TOTAL.with_label_values(&["plc", reason.as_str()]).inc();
    reply_rplc(ctx, addr, RplcMessage::LinkAck { reason }).await;
}

async fn handle_establish(ctx: &RouterContext, addr: SocketAddr, version: u16, role: EstablishRole) {
    let (outcome, kind) = match role {
        EstablishRole::Rtu => (
            ctx.registry.establish_rtu(addr, version, ctx.config.rtu_timeout, Vec::new()),
            SessionKindTag::Rtu,
        ),
        EstablishRole::Coord => (
            ctx.registry.establish_coord(addr, version, ctx.config.crd_timeout),
            SessionKindTag::Coord,
        ),
        EstablishRole::Pocket => (
            ctx.registry.establish_pocket(addr, version, ctx.config.pkt_timeout),
            SessionKindTag::Pocket,
        ),
    };
    let outcome_label = match outcome {
        LinkOutcome::Allowed(_) => "allow",
        LinkOutcome::Collision => "collision",
        LinkOutcome::BadVersion => "bad_version",
    };
    SESSION_ESTABLISH_TOTAL.with_label_values(&[kind.as_str(), outcome_label]).inc();
    match outcome {
        LinkOutcome::Allowed(session_id) => spawn_session(ctx, session_id, kind),
        // `Establish` has no room for a richer reply shape than
        // keepalive/close in the current wire protocol; a
        // `BadVersion`/`Collision` outcome is surfaced the same way an
        // orphan packet is — a deny hint prompts the peer to retry its
        // handshake with corrected parameters.
        _ => send_deny_hint(ctx, addr).await,
    }
}

/// Hands a freshly-established session's inbox to its dispatch loop,
/// wrapped in a [`SessionGuard`] so a panicked or cancelled dispatch task
/// can never leave a dangling registry entry.
fn spawn_session(ctx: &RouterContext, session_id: u64, kind: SessionKindTag) {
    let Some(handle) = ctx.registry.find_by_id(session_id) else {
        return;
    };
    let inbox = handle.lock().meta_mut().take_inbox();
    let Some(inbox) = inbox else {
        return;
    };
    let guard = SessionGuard::new(ctx.registry.clone(), ctx.facility.clone(), session_id, kind);
    let facility = ctx.facility.clone();
    let transport = ctx.transport.clone();
    let config = ctx.config.clone();
    let registry = ctx.registry.clone();
    tokio::spawn(async move {
        dispatch::run(kind, session_id, guard, inbox, registry, facility, transport, config).await;
    });
}

async fn reply_rplc(ctx: &RouterContext, addr: SocketAddr, msg: RplcMessage) {
    let Ok(payload) = crate::core::protocol::rplc::encode(&msg) else {
        return;
    };
    let frame = Frame {
        src_channel: ctx.config.plc_channel,
        dst_channel: addr.port(),
        protocol: ProtocolTag::Rplc,
        seq: 0,
        timestamp_ms: now_ms(),
        payload,
        mac: None,
    };
    let bytes = encode_frame(&frame, ctx.config.auth_key.as_deref().map(str::as_bytes));
    let _ = ctx.transport.send(addr, &bytes).await;
}
