// src/connection/dispatch.rs

//! Per-session dispatch loops: one task per established session drains its
//! inbox in arrival order (spec.md §5) and applies the decoded packet
//! against the facility-owner state, replying over the transport where the
//! protocol calls for it. Grounded on the teacher's per-connection
//! `ConnectionHandler::run` loop, generalized from one client kind to four.

use crate::config::SupervisorConfig;
use crate::connection::guard::SessionGuard;
use crate::core::alarm::AlarmEvent;
use crate::core::facility::FacilityState;
use crate::core::protocol::coord_data::{CoordDataMessage, FacilityCmd, UnitCmd};
use crate::core::protocol::frame::{Frame, encode_frame};
use crate::core::protocol::modbus::ModbusPdu;
use crate::core::protocol::rplc::{RplcMessage, WasteMode};
use crate::core::protocol::scada_mgmt::ScadaMgmtMessage;
use crate::core::protocol::Packet;
use crate::core::session::rtu::{validate_advert, AdvertValidation, RtuUnitEntry, RtuUnitKind};
use crate::core::session::{InboxMessage, SessionId, SessionKind, SessionKindTag, SessionRegistry};
use crate::core::transport::DatagramTransport;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Sends one packet to the session identified by `session_id`, bumping its
/// outgoing sequence counter. Silently drops if the session has since
/// closed — the watchdog/guard path is the single source of truth for
/// session lifetime, not the send path.
pub(crate) async fn send_packet(
    registry: &SessionRegistry,
    transport: &dyn DatagramTransport,
    config: &SupervisorConfig,
    src_channel: u16,
    session_id: SessionId,
    packet: &Packet,
) {
    let Some(handle) = registry.find_by_id(session_id) else {
        return;
    };
    let Ok(payload) = packet.encode() else {
        return;
    };
    let (dst_addr, seq) = {
        let mut session = handle.lock();
        let addr = session.meta().remote_addr;
        let seq = session.meta_mut().next_tx_seq();
        (addr, seq)
    };
    let frame = Frame {
        src_channel,
        dst_channel: dst_addr.port(),
        protocol: packet.protocol_tag(),
        seq,
        timestamp_ms: now_ms(),
        payload,
        mac: None,
    };
    let bytes = encode_frame(&frame, config.auth_key.as_deref().map(str::as_bytes));
    let _ = transport.send(dst_addr, &bytes).await;
}

/// The dispatch loop entry point spawned by the router on every successful
/// handshake. Runs until the inbox closes (session closed/pruned), at
/// which point `guard` drops and tears the session back down.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    kind: SessionKindTag,
    session_id: SessionId,
    guard: SessionGuard,
    mut inbox: mpsc::UnboundedReceiver<InboxMessage>,
    registry: Arc<SessionRegistry>,
    facility: Arc<Mutex<FacilityState>>,
    transport: Arc<dyn DatagramTransport>,
    config: Arc<SupervisorConfig>,
) {
    let _guard = guard;
    while let Some(message) = inbox.recv().await {
        let packet = match Packet::decode(message.protocol, &message.payload) {
            Ok(p) => p,
            Err(e) => {
                debug!(session_id, ?kind, error = %e, "dropped undecodable session payload");
                continue;
            }
        };
        match kind {
            SessionKindTag::Plc => handle_plc(session_id, &facility, &registry, packet).await,
            SessionKindTag::Rtu => handle_rtu(session_id, &facility, &registry, &transport, &config, packet).await,
            SessionKindTag::Coord => {
                handle_coord_or_pocket(session_id, &facility, &registry, &transport, &config, packet, false).await
            }
            SessionKindTag::Pocket => {
                handle_coord_or_pocket(session_id, &facility, &registry, &transport, &config, packet, true).await
            }
        }
    }
}

async fn handle_plc(session_id: SessionId, facility: &Mutex<FacilityState>, registry: &SessionRegistry, packet: Packet) {
    let Packet::Rplc(msg) = packet else {
        debug!(session_id, "plc session received a non-RPLC packet, dropping");
        return;
    };
    let Some(handle) = registry.find_by_id(session_id) else {
        return;
    };
    let reactor_id = match &*handle.lock() {
        SessionKind::Plc(plc) => plc.reactor_id,
        _ => return,
    };
    match msg {
        RplcMessage::Status { telemetry } | RplcMessage::TelemetryDelta { telemetry } => {
            if let SessionKind::Plc(plc) = &mut *handle.lock() {
                plc.apply_telemetry(telemetry);
            }
            let mut facility = facility.lock().await;
            if let Some(unit) = facility.unit_mut(reactor_id) {
                unit.db = telemetry;
            }
        }
        RplcMessage::RpsStatus { status } => {
            if let SessionKind::Plc(plc) = &mut *handle.lock() {
                plc.apply_rps_status(status);
            }
            let mut facility = facility.lock().await;
            if let Some(unit) = facility.unit_mut(reactor_id) {
                unit.rps_mirror = status;
            }
        }
        RplcMessage::RpsAlarm { trip_causes } => {
            let mut facility = facility.lock().await;
            if let Some(unit) = facility.unit_mut(reactor_id) {
                unit.rps_mirror.trip_causes |= trip_causes;
                unit.annunciators[0].latch(AlarmEvent::Trip);
            }
        }
        // The supervisor only ever originates `LinkReq`/`LinkAck`/`Command`;
        // receiving one back from a PLC is a protocol violation, not a
        // session-ending error.
        RplcMessage::LinkReq { .. } | RplcMessage::LinkAck { .. } | RplcMessage::Command { .. } => {
            warn!(session_id, "plc sent a supervisor-originated message shape, ignoring");
        }
    }
}

async fn handle_rtu(
    session_id: SessionId,
    facility: &Mutex<FacilityState>,
    registry: &SessionRegistry,
    transport: &dyn DatagramTransport,
    config: &SupervisorConfig,
    packet: Packet,
) {
    let Some(handle) = registry.find_by_id(session_id) else {
        return;
    };
    match packet {
        Packet::ScadaMgmt(ScadaMgmtMessage::RtuAdvert { units }) => {
            let existing_count = match &*handle.lock() {
                SessionKind::Rtu(rtu) => rtu.units.len() as u32,
                _ => return,
            };
            let mut facility = facility.lock().await;
            let mut has_imatrix = facility.rtu_sessions_by_kind.induction.is_some();
            let mut has_sps = facility.rtu_sessions_by_kind.sps.is_some();
            let mut next_uid = existing_count;
            let mut accepted_uids = Vec::new();
            let mut rejected = Vec::new();
            let mut accepted_entries = Vec::new();

            for unit in &units {
                let ctx = AdvertValidation {
                    unit_count: facility.unit_count,
                    boiler_count_of: &|id| facility.unit(id).map(|u| u.boilers),
                    turbine_count_of: &|id| facility.unit(id).map(|u| u.turbines),
                    has_imatrix,
                    has_sps,
                };
                match validate_advert(unit, &ctx) {
                    Ok(()) => {
                        next_uid += 1;
                        let kind = RtuUnitKind::from(unit.kind);
                        if matches!(kind, RtuUnitKind::Imatrix) {
                            has_imatrix = true;
                        }
                        if matches!(kind, RtuUnitKind::Sps) {
                            has_sps = true;
                        }
                        accepted_uids.push(next_uid);
                        accepted_entries.push(RtuUnitEntry::new(next_uid, kind, unit.name.clone(), unit.index, unit.reactor));
                    }
                    Err(reason) => {
                        next_uid += 1;
                        rejected.push((next_uid, reason));
                    }
                }
            }

            for entry in &accepted_entries {
                match entry.kind {
                    RtuUnitKind::Imatrix => facility.rtu_sessions_by_kind.induction = Some(session_id),
                    RtuUnitKind::Sps => facility.rtu_sessions_by_kind.sps = Some(session_id),
                    RtuUnitKind::EnvDetector => facility.rtu_sessions_by_kind.envd.push(session_id),
                    RtuUnitKind::Redstone => facility.rtu_sessions_by_kind.redstone.push(session_id),
                    RtuUnitKind::BoilerValve | RtuUnitKind::TurbineValve => {
                        if !facility.rtu_sessions_by_kind.tanks.contains(&session_id) {
                            facility.rtu_sessions_by_kind.tanks.push(session_id);
                        }
                        if let Some(unit) = facility.unit_mut(entry.reactor) {
                            if !unit.rtu_sessions.contains(&session_id) {
                                unit.rtu_sessions.push(session_id);
                            }
                            match entry.kind {
                                RtuUnitKind::BoilerValve => unit.linked_boilers += 1,
                                RtuUnitKind::TurbineValve => unit.linked_turbines += 1,
                                _ => {}
                            }
                        }
                    }
                    RtuUnitKind::DynamicValve | RtuUnitKind::Sna | RtuUnitKind::Virtual => {}
                }
            }
            drop(facility);

            if let SessionKind::Rtu(rtu) = &mut *handle.lock() {
                rtu.units.extend(accepted_entries);
            }

            let reply = Packet::ScadaMgmt(ScadaMgmtMessage::RtuAdvertAck { accepted_uids, rejected });
            send_packet(registry, transport, config, config.rtu_channel, session_id, &reply).await;
        }
        Packet::ScadaMgmt(ScadaMgmtMessage::Remounted { uid }) => {
            if let SessionKind::Rtu(rtu) = &mut *handle.lock() {
                if let Some(entry) = rtu.units.iter_mut().find(|u| u.uid == uid) {
                    entry.poll_formed(true);
                }
            }
        }
        Packet::ScadaMgmt(ScadaMgmtMessage::KeepAlive) => {}
        Packet::Modbus(ModbusPdu::Request(req)) => {
            let reply = {
                let mut session = handle.lock();
                let SessionKind::Rtu(rtu) = &mut *session else {
                    return;
                };
                rtu.units
                    .iter_mut()
                    .find(|u| u.uid == req.unit_id as u32)
                    .map(|entry| crate::core::modbus_server::service_request(entry.server.as_mut(), &req))
            };
            if let Some(reply) = reply {
                let reply = Packet::Modbus(ModbusPdu::Reply(reply));
                send_packet(registry, transport, config, config.rtu_channel, session_id, &reply).await;
            }
        }
        _ => debug!(session_id, "rtu session received an unexpected packet shape, dropping"),
    }
}

/// Coordinators and pockets share a wire shape; pockets are read-only, so
/// `FacCmd`/`UnitCmd` from one are a protocol violation rather than an
/// accepted (if unusual) request (spec.md §1 "Pocket: handheld read-only
/// console").
#[allow(clippy::too_many_arguments)]
async fn handle_coord_or_pocket(
    session_id: SessionId,
    facility: &Mutex<FacilityState>,
    registry: &SessionRegistry,
    transport: &dyn DatagramTransport,
    config: &SupervisorConfig,
    packet: Packet,
    read_only: bool,
) {
    let Packet::CoordData(msg) = packet else {
        debug!(session_id, "coord/pocket session received a non-COORD_DATA packet, dropping");
        return;
    };
    if read_only && matches!(msg, CoordDataMessage::FacCmd(_) | CoordDataMessage::UnitCmd { .. }) {
        warn!(session_id, "pocket session issued a command, ignoring (read-only)");
        return;
    }
    match msg {
        CoordDataMessage::FacCmd(cmd) => {
            let mut facility = facility.lock().await;
            apply_facility_cmd(&mut facility, cmd);
        }
        CoordDataMessage::UnitCmd { unit_id, cmd } => {
            apply_unit_cmd(facility, registry, transport, config, unit_id, cmd).await;
        }
        CoordDataMessage::FacBuilds { .. } | CoordDataMessage::UnitBuilds { .. } => {
            // Build-out notifications are advisory; the facility's own
            // `unit_count`/per-unit boiler-turbine counts are the source of
            // truth (set at startup from the settings blob).
        }
        CoordDataMessage::FacStatus(_) | CoordDataMessage::UnitStatus(_) => {
            debug!(session_id, "dropped a supervisor-originated status frame echoed back");
        }
    }
}

fn apply_facility_cmd(facility: &mut FacilityState, cmd: FacilityCmd) {
    match cmd {
        FacilityCmd::AutoStart(cfg) => {
            let cfg = crate::core::facility::AutoStartConfig {
                mode: cfg.mode,
                burn_target: cfg.burn_target,
                charge_setpoint: cfg.charge_setpoint,
                gen_rate_setpoint: cfg.gen_rate_setpoint,
                limits: cfg.limits,
            };
            if let Err(e) = facility.auto_start(cfg) {
                warn!(error = %e, "auto_start rejected");
            }
        }
        FacilityCmd::AutoStop => facility.auto_stop(),
        FacilityCmd::Ack => facility.ack_scram(),
        FacilityCmd::SetGroup { unit_id, group } => {
            if let Err(e) = facility.set_group(unit_id, group) {
                warn!(error = %e, "set_group rejected");
            }
        }
        FacilityCmd::SetWaste { unit_id, mode } => {
            if let Some(unit) = facility.unit_mut(unit_id) {
                unit.auto_waste = matches!(mode, WasteMode::Auto);
            }
        }
        FacilityCmd::SetPuFallback(_) | FacilityCmd::SetSpsLowPower(_) => {
            // Facility-wide device policy toggles with no counterpart in
            // the current facility data model; acknowledged but not yet
            // persisted anywhere a status push would reflect.
        }
    }
}

/// Sends one `RPLC::Command` to the PLC session linked to `unit_id`, if any.
/// Used for the operator-issued per-unit commands that go straight to the
/// reactor rather than through the facility-wide auto-control loop.
async fn send_unit_command(
    facility: &Mutex<FacilityState>,
    registry: &SessionRegistry,
    transport: &dyn DatagramTransport,
    config: &SupervisorConfig,
    unit_id: u32,
    command: RplcMessage,
) {
    let plc_session = {
        let facility = facility.lock().await;
        facility.unit(unit_id).and_then(|u| u.plc_session)
    };
    let Some(plc_session) = plc_session else {
        warn!(unit_id, "unit command addressed to a unit with no linked plc");
        return;
    };
    let packet = Packet::Rplc(command);
    send_packet(registry, transport, config, config.plc_channel, plc_session, &packet).await;
}

async fn apply_unit_cmd(
    facility: &Mutex<FacilityState>,
    registry: &SessionRegistry,
    transport: &dyn DatagramTransport,
    config: &SupervisorConfig,
    unit_id: u32,
    cmd: UnitCmd,
) {
    match cmd {
        UnitCmd::Scram => {
            let command = RplcMessage::Command {
                set_burn_rate: None,
                scram: true,
                reset_rps: false,
                set_waste: None,
            };
            send_unit_command(facility, registry, transport, config, unit_id, command).await;
        }
        UnitCmd::ResetRps => {
            let command = RplcMessage::Command {
                set_burn_rate: None,
                scram: false,
                reset_rps: true,
                set_waste: None,
            };
            send_unit_command(facility, registry, transport, config, unit_id, command).await;
        }
        UnitCmd::Ack { alarm_index } => {
            let mut facility = facility.lock().await;
            if let Some(unit) = facility.unit_mut(unit_id) {
                if let Some(annunciator) = unit.annunciators.get_mut(alarm_index as usize) {
                    annunciator.latch(AlarmEvent::Ack);
                }
            } else {
                warn!(unit_id, "unit command addressed to an unknown unit");
            }
        }
        UnitCmd::BurnRate(target) => {
            // Only meaningful for an independent unit (group 0); a
            // group-controlled unit's setpoint comes from the facility-wide
            // auto-control loop instead, which would just overwrite this on
            // the next tick. Recorded on the PLC session so the scheduler's
            // resend-until-converged loop (`PlcSession::tick_burn_rate`)
            // carries it out.
            let plc_session = {
                let facility = facility.lock().await;
                facility.unit(unit_id).and_then(|u| u.plc_session)
            };
            let Some(plc_session) = plc_session else {
                warn!(unit_id, "burn_rate command addressed to a unit with no linked plc");
                return;
            };
            let Some(handle) = registry.find_by_id(plc_session) else {
                return;
            };
            if let SessionKind::Plc(plc) = &mut *handle.lock() {
                plc.set_burn_rate_target(target);
            }
        }
        UnitCmd::Waste(mode) => {
            let mut facility = facility.lock().await;
            if let Some(unit) = facility.unit_mut(unit_id) {
                unit.auto_waste = matches!(mode, WasteMode::Auto);
            } else {
                warn!(unit_id, "unit command addressed to an unknown unit");
            }
        }
        UnitCmd::Group(group) => {
            let mut facility = facility.lock().await;
            if let Err(e) = facility.set_group(unit_id, group) {
                warn!(error = %e, "set_group rejected");
            }
        }
    }
}
