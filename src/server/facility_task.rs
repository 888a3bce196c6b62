// src/server/facility_task.rs

//! The facility-owner scheduler: a single 2 Hz tick loop that drives every
//! time-based piece of the supervisor core (spec.md §4.9) — watchdog scans,
//! the safety supervisor, the auto-control step, the alarm/tone mixer, and
//! the periodic status push to every coordinator/pocket session. Grounded
//! on the teacher's `MasterMonitor::run_tick_loop`: one `tokio::select!`
//! over a tick interval and the shutdown signal, generalized from a single
//! sweep of expired keys to the whole facility update.

use crate::config::SupervisorConfig;
use crate::connection::dispatch::send_packet;
use crate::core::alarm::ToneMixer;
use crate::core::facility::FacilityState;
use crate::core::localize;
use crate::core::metrics::{
    ASCRAM_ACTIVE, ASCRAM_TRIPS_TOTAL, FACILITY_MODE, SESSIONS_ACTIVE, TICK_DURATION_SECONDS, TICKS_TOTAL,
    UNITS_READY, WATCHDOG_TIMEOUTS_TOTAL,
};
use crate::core::protocol::coord_data::{CoordDataMessage, FacilityStatusFrame, UnitStatusFrame};
use crate::core::protocol::rplc::RplcMessage;
use crate::core::protocol::Packet;
use crate::core::scheduler::{self, TimerTable};
use crate::core::session::{SessionId, SessionKind, SessionKindTag, SessionRegistry};
use crate::core::transport::DatagramTransport;
use crate::core::warden::{SafetySupervisor, ScramReason, ScramSink};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{info, warn};

/// Every handle the facility task needs. Bundled the same way
/// [`crate::connection::router::RouterContext`] bundles the router's.
pub struct FacilityTaskContext {
    pub registry: Arc<SessionRegistry>,
    pub facility: Arc<Mutex<FacilityState>>,
    pub transport: Arc<dyn DatagramTransport>,
    pub config: Arc<SupervisorConfig>,
}

/// Broadcasts an unconditional `scram: true` command to a fixed list of PLC
/// sessions, captured by the caller while it already held the facility
/// lock. [`ScramSink::scram_all`] is a synchronous callback (spec.md §4.6's
/// safety supervisor has no I/O of its own), so each send is handed off to
/// an independent task rather than awaited here.
struct BroadcastScramSink<'a> {
    plc_sessions: &'a [SessionId],
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn DatagramTransport>,
    config: Arc<SupervisorConfig>,
}

impl ScramSink for BroadcastScramSink<'_> {
    fn scram_all(&self, reason: ScramReason) {
        warn!(?reason, plc_count = self.plc_sessions.len(), "auto-scram: broadcasting to every linked reactor");
        ASCRAM_TRIPS_TOTAL.with_label_values(&[reason.status_key()]).inc();
        for &session_id in self.plc_sessions {
            let registry = self.registry.clone();
            let transport = self.transport.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                let command = Packet::Rplc(RplcMessage::Command {
                    set_burn_rate: None,
                    scram: true,
                    reset_rps: false,
                    set_waste: None,
                });
                send_packet(&registry, transport.as_ref(), &config, config.plc_channel, session_id, &command).await;
            });
        }
    }
}

/// Runs the facility scheduler until `shutdown_rx` fires. Owns the safety
/// supervisor and tone mixer for the lifetime of the process — both carry
/// state across ticks (the SCRAM latch, the diagnostic test-tone override)
/// that must survive every individual tick's facility-lock scope.
pub async fn run(ctx: FacilityTaskContext, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
    let mut tick = scheduler::tick_interval(scheduler::DEFAULT_TICK_HZ);
    let mut status_timer: TimerTable<&'static str> = TimerTable::new();
    status_timer.register("status_push", std::time::Duration::from_secs(1), Instant::now());
    let mut safety = SafetySupervisor::new();
    let mut tone_mixer = ToneMixer::default();

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!("facility scheduler shutting down");
                return Ok(());
            }
            _ = tick.tick() => {
                let _timer = TICK_DURATION_SECONDS.start_timer();
                TICKS_TOTAL.inc();
                run_one_tick(&ctx, &mut safety, &mut tone_mixer, &mut status_timer).await;
            }
        }
    }
}

async fn run_one_tick(
    ctx: &FacilityTaskContext,
    safety: &mut SafetySupervisor,
    tone_mixer: &mut ToneMixer,
    status_timer: &mut TimerTable<&'static str>,
) {
    let now = Instant::now();

    let expired = ctx.registry.tick(now);
    if !expired.is_empty() {
        let mut facility = ctx.facility.lock().await;
        for close_info in &expired {
            WATCHDOG_TIMEOUTS_TOTAL.with_label_values(&[close_info.kind_tag.as_str()]).inc();
            if let Some(reactor_id) = close_info.reactor_id {
                if let Some(unit) = facility.unit_mut(reactor_id) {
                    unit.plc_unlinked();
                }
            }
        }
    }

    let mut facility = ctx.facility.lock().await;

    let plc_sessions: Vec<SessionId> = facility.units.iter().filter_map(|u| u.plc_session).collect();
    let sink = BroadcastScramSink {
        plc_sessions: &plc_sessions,
        registry: ctx.registry.clone(),
        transport: ctx.transport.clone(),
        config: ctx.config.clone(),
    };
    safety.evaluate_and_maybe_trip(&mut facility, &sink);

    let assignments = facility.step_control(1.0 / scheduler::DEFAULT_TICK_HZ);
    for assignment in &assignments {
        let Some(unit) = facility.unit(assignment.unit_id) else { continue };
        let Some(plc_session) = unit.plc_session else { continue };
        let Some(handle) = ctx.registry.find_by_id(plc_session) else { continue };
        let due = {
            let SessionKind::Plc(plc) = &mut *handle.lock() else { continue };
            plc.set_burn_rate_target(assignment.burn);
            plc.tick_burn_rate(ctx.config.burn_resend_ticks)
        };
        if let Some(target) = due {
            let command = Packet::Rplc(RplcMessage::Command {
                set_burn_rate: Some(target),
                scram: false,
                reset_rps: false,
                set_waste: None,
            });
            send_packet(&ctx.registry, ctx.transport.as_ref(), &ctx.config, ctx.config.plc_channel, plc_session, &command).await;
        }
    }

    let table = ctx.config.translation_table();
    facility.status_text[0] = localize::lookup(&table, facility.mode.status_key()).to_string();
    facility.status_text[1] = facility
        .ascram_reason
        .map(|r| localize::lookup(&table, r.status_key()).to_string())
        .unwrap_or_default();

    facility.tones = tone_mixer.mix_all(facility.units.iter().map(|u| &u.annunciators));

    update_metrics(ctx, &facility);

    if status_timer.poll_expired(now).contains(&"status_push") {
        push_status(ctx, &facility).await;
    }
}

fn update_metrics(ctx: &FacilityTaskContext, facility: &FacilityState) {
    for kind in [SessionKindTag::Plc, SessionKindTag::Rtu, SessionKindTag::Coord, SessionKindTag::Pocket] {
        SESSIONS_ACTIVE
            .with_label_values(&[kind.as_str()])
            .set(ctx.registry.ids_by_kind(kind).len() as f64);
    }
    UNITS_READY.set(facility.units.iter().filter(|u| u.ready()).count() as f64);
    for mode in [
        crate::core::facility::FacilityMode::Inactive,
        crate::core::facility::FacilityMode::Monitored,
        crate::core::facility::FacilityMode::BurnRate,
        crate::core::facility::FacilityMode::Charge,
        crate::core::facility::FacilityMode::GenRate,
        crate::core::facility::FacilityMode::GenRateFaultIdle,
    ] {
        FACILITY_MODE
            .with_label_values(&[mode.as_str()])
            .set(if facility.mode == mode { 1.0 } else { 0.0 });
    }
    ASCRAM_ACTIVE.set(if facility.ascram { 1.0 } else { 0.0 });
}

/// Pushes `FAC_STATUS` and one `UNIT_STATUS` per unit to every linked
/// coordinator and pocket session (spec.md §4.5). Pockets are read-only but
/// still receive every status push, same as a coordinator.
async fn push_status(ctx: &FacilityTaskContext, facility: &FacilityState) {
    let fac_status = Packet::CoordData(CoordDataMessage::FacStatus(FacilityStatusFrame {
        mode: facility.mode.into(),
        status_text: facility.status_text.clone(),
        tones: facility.tones,
        ascram: facility.ascram,
        ascram_reason: facility.ascram_reason.map(|r| r.status_key().to_string()),
        avg_charge: facility.avg_charge,
        avg_inflow: facility.avg_inflow,
        avg_outflow: facility.avg_outflow,
        avg_net: facility.avg_net,
    }));

    let unit_statuses: Vec<Packet> = facility
        .units
        .iter()
        .map(|u| {
            let mut alarm_states = [0u8; 16];
            for (i, a) in u.annunciators.iter().enumerate() {
                alarm_states[i] = a.state() as u8;
            }
            Packet::CoordData(CoordDataMessage::UnitStatus(UnitStatusFrame {
                unit_id: u.id,
                plc_linked: u.plc_session.is_some(),
                ready: u.ready(),
                burn_target_100: u.burn_target_100,
                requested_burn_100: u.requested_burn_100,
                alarm_states,
            }))
        })
        .collect();

    for kind in [SessionKindTag::Coord, SessionKindTag::Pocket] {
        for session_id in ctx.registry.ids_by_kind(kind) {
            send_packet(&ctx.registry, ctx.transport.as_ref(), &ctx.config, ctx.config.crd_channel, session_id, &fac_status).await;
            for packet in &unit_statuses {
                send_packet(&ctx.registry, ctx.transport.as_ref(), &ctx.config, ctx.config.crd_channel, session_id, packet).await;
            }
        }
    }
}
