// src/core/metrics.rs

//! Defines and registers Prometheus metrics for supervisor monitoring.
//!
//! Uses `lazy_static` so metrics are registered exactly once globally, the
//! same approach the teacher crate uses for its own metric set.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
};

lazy_static! {
    // --- Session gauges ---
    pub static ref SESSIONS_ACTIVE: GaugeVec = register_gauge_vec!(
        "scada_sessions_active",
        "Number of currently linked sessions, labeled by kind (plc, rtu, coord, pocket).",
        &["kind"]
    )
    .unwrap();

    pub static ref UNITS_READY: Gauge = register_gauge!(
        "scada_units_ready",
        "Number of reactor units currently ready (PLC linked, all boilers/turbines linked and unfaulted)."
    )
    .unwrap();

    pub static ref FACILITY_MODE: GaugeVec = register_gauge_vec!(
        "scada_facility_mode",
        "One-hot indicator of the active facility auto-control mode.",
        &["mode"]
    )
    .unwrap();

    pub static ref ASCRAM_ACTIVE: Gauge = register_gauge!(
        "scada_ascram_active",
        "1 if an auto-SCRAM condition is currently latched, else 0."
    )
    .unwrap();

    // --- Counters ---
    pub static ref PACKETS_DECODED_TOTAL: CounterVec = register_counter_vec!(
        "scada_packets_decoded_total",
        "Total packets successfully decoded, labeled by protocol family.",
        &["protocol"]
    )
    .unwrap();

    pub static ref PACKETS_DROPPED_TOTAL: CounterVec = register_counter_vec!(
        "scada_packets_dropped_total",
        "Total packets dropped, labeled by drop reason.",
        &["reason"]
    )
    .unwrap();

    pub static ref SESSION_ESTABLISH_TOTAL: CounterVec = register_counter_vec!(
        "scada_session_establish_total",
        "Total session establishment attempts, labeled by kind and outcome.",
        &["kind", "outcome"]
    )
    .unwrap();

    pub static ref WATCHDOG_TIMEOUTS_TOTAL: CounterVec = register_counter_vec!(
        "scada_watchdog_timeouts_total",
        "Total sessions closed due to watchdog expiry, labeled by kind.",
        &["kind"]
    )
    .unwrap();

    pub static ref ASCRAM_TRIPS_TOTAL: CounterVec = register_counter_vec!(
        "scada_ascram_trips_total",
        "Total auto-SCRAM trips, labeled by reason.",
        &["reason"]
    )
    .unwrap();

    pub static ref TICKS_TOTAL: Counter =
        register_counter!("scada_ticks_total", "Total facility scheduler ticks processed.").unwrap();

    // --- Histograms ---
    pub static ref TICK_DURATION_SECONDS: Histogram = register_histogram!(
        "scada_tick_duration_seconds",
        "Wall-clock time spent executing one facility tick."
    )
    .unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
