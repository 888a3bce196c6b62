// src/core/localize.rs

//! Operator-facing strings are looked up from a translation table rather
//! than hard-coded, per Design Notes §9 ("Localization"). The supervisor
//! core only needs the lookup keys used in `status_text` and alarm labels;
//! the UI layer owns the full catalogue and locale switching.

use std::collections::HashMap;

/// The built-in English table. A deployment can override entries by
/// shipping its own table through [`crate::config::SupervisorConfig`].
pub fn default_table() -> HashMap<&'static str, &'static str> {
    let mut table = HashMap::new();
    table.insert("status.inactive", "Inactive");
    table.insert("status.monitored", "Monitored");
    table.insert("status.burn_rate", "Burn Rate Control");
    table.insert("status.charge", "Charge Control");
    table.insert("status.gen_rate", "Generation Rate Control");
    table.insert("status.gen_rate_fault_idle", "Generation Fault (Idle)");
    table.insert("ascram.matrix_dc", "Induction Matrix Disconnected");
    table.insert("ascram.matrix_fill", "Induction Matrix Full");
    table.insert("ascram.crit_alarm", "Critical Unit Alarm");
    table.insert("ascram.radiation", "Radiation Detected");
    table.insert("ascram.gen_fault", "Generation Fault");
    table
}

/// Looks a key up in `table`, falling back to the key itself so a missing
/// translation never produces empty operator text.
pub fn lookup<'a>(table: &'a HashMap<&'static str, &'static str>, key: &'a str) -> &'a str {
    table.get(key).copied().unwrap_or(key)
}
