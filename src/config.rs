// src/config.rs

//! Manages supervisor configuration: loading the persisted settings blob,
//! validating it, and defaulting new fields the way the teacher's
//! `Config::from_file` does for its TOML configuration.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

/// Per-unit cooling configuration, one entry per reactor (1-indexed by
/// position in the vector).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CoolingConfig {
    pub turbine_count: u8,
    pub boiler_count: u8,
    /// Which of the 7 tank-topology connection modes this unit participates in.
    pub tank_connection: u8,
}

/// The persisted settings blob described in spec.md §6. Every field maps
/// 1:1 to a legacy key/value entry; new fields default via `#[serde(default
/// = "...")]` so older settings files still load.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SupervisorConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_unit_count")]
    pub unit_count: u8,
    #[serde(default)]
    pub cooling_config: Vec<CoolingConfig>,
    #[serde(default)]
    pub facility_tank_mode: u8,
    #[serde(default)]
    pub facility_tank_defs: Vec<u8>,
    #[serde(default)]
    pub tank_fluid_types: Vec<String>,
    #[serde(default)]
    pub auxiliary_coolant: Vec<bool>,
    #[serde(default)]
    pub ext_charge_idling: bool,

    #[serde(default = "default_svr_channel")]
    pub svr_channel: u16,
    #[serde(default = "default_plc_channel")]
    pub plc_channel: u16,
    #[serde(default = "default_rtu_channel")]
    pub rtu_channel: u16,
    #[serde(default = "default_crd_channel")]
    pub crd_channel: u16,
    #[serde(default = "default_pkt_channel")]
    pub pkt_channel: u16,

    #[serde(default = "default_plc_timeout", with = "humantime_serde")]
    pub plc_timeout: Duration,
    #[serde(default = "default_rtu_timeout", with = "humantime_serde")]
    pub rtu_timeout: Duration,
    #[serde(default = "default_crd_timeout", with = "humantime_serde")]
    pub crd_timeout: Duration,
    #[serde(default = "default_pkt_timeout", with = "humantime_serde")]
    pub pkt_timeout: Duration,

    /// 0 = unlimited.
    #[serde(default)]
    pub trusted_range: u32,
    /// Shared HMAC key. `None` disables packet authentication.
    #[serde(default)]
    pub auth_key: Option<String>,

    #[serde(default = "default_log_mode")]
    pub log_mode: String,
    #[serde(default = "default_log_path")]
    pub log_path: String,
    #[serde(default)]
    pub log_debug: bool,

    #[serde(default = "default_front_panel_theme")]
    pub front_panel_theme: String,
    #[serde(default = "default_color_mode")]
    pub color_mode: String,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Safety-loop tuning: how many ticks a `set_burn_rate` command is
    /// re-sent until the PLC's reported burn converges (spec.md §4.3).
    #[serde(default = "default_burn_resend_ticks")]
    pub burn_resend_ticks: u32,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}
fn default_unit_count() -> u8 {
    1
}
fn default_svr_channel() -> u16 {
    16240
}
fn default_plc_channel() -> u16 {
    16241
}
fn default_rtu_channel() -> u16 {
    16242
}
fn default_crd_channel() -> u16 {
    16243
}
fn default_pkt_channel() -> u16 {
    16244
}
fn default_plc_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_rtu_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_crd_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_pkt_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_log_mode() -> String {
    "append".to_string()
}
fn default_log_path() -> String {
    "/log.txt".to_string()
}
fn default_front_panel_theme() -> String {
    "standard".to_string()
}
fn default_color_mode() -> String {
    "standard".to_string()
}
fn default_metrics_port() -> u16 {
    9898
}
fn default_burn_resend_ticks() -> u32 {
    6
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            unit_count: default_unit_count(),
            cooling_config: vec![CoolingConfig {
                turbine_count: 1,
                boiler_count: 1,
                tank_connection: 0,
            }],
            facility_tank_mode: 0,
            facility_tank_defs: vec![0],
            tank_fluid_types: Vec::new(),
            auxiliary_coolant: Vec::new(),
            ext_charge_idling: false,
            svr_channel: default_svr_channel(),
            plc_channel: default_plc_channel(),
            rtu_channel: default_rtu_channel(),
            crd_channel: default_crd_channel(),
            pkt_channel: default_pkt_channel(),
            plc_timeout: default_plc_timeout(),
            rtu_timeout: default_rtu_timeout(),
            crd_timeout: default_crd_timeout(),
            pkt_timeout: default_pkt_timeout(),
            trusted_range: 0,
            auth_key: None,
            log_mode: default_log_mode(),
            log_path: default_log_path(),
            log_debug: false,
            front_panel_theme: default_front_panel_theme(),
            color_mode: default_color_mode(),
            metrics_port: default_metrics_port(),
            metrics_enabled: true,
            burn_resend_ticks: default_burn_resend_ticks(),
        }
    }
}

impl SupervisorConfig {
    /// Loads and validates the settings blob from a TOML file on disk.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file '{path}'"))?;
        let config: SupervisorConfig =
            toml::from_str(&contents).with_context(|| "failed to parse configuration TOML")?;
        config
            .validate()
            .map_err(|e| anyhow!("configuration invalid: {e}"))?;
        Ok(config)
    }

    /// Validates cross-field invariants the spec requires before `startup()`
    /// is permitted: unit count in range, per-unit cooling config present,
    /// and the tank layout sized consistently with `unit_count`.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=4).contains(&self.unit_count) {
            return Err(format!(
                "unit_count must be between 1 and 4, got {}",
                self.unit_count
            ));
        }
        if self.cooling_config.len() != self.unit_count as usize {
            return Err(format!(
                "cooling_config has {} entries, expected {} (one per unit)",
                self.cooling_config.len(),
                self.unit_count
            ));
        }
        for cfg in &self.cooling_config {
            if cfg.boiler_count == 0 || cfg.turbine_count == 0 {
                return Err("each unit requires at least one boiler and one turbine".to_string());
            }
        }
        if !(0..=7).contains(&self.facility_tank_mode) {
            return Err(format!(
                "facility_tank_mode must be 0..=7, got {}",
                self.facility_tank_mode
            ));
        }
        if self.facility_tank_defs.len() != self.unit_count as usize {
            return Err(format!(
                "facility_tank_defs has {} entries, expected {}",
                self.facility_tank_defs.len(),
                self.unit_count
            ));
        }
        if self.facility_tank_defs.iter().any(|d| *d > 2) {
            return Err("facility_tank_defs entries must be 0, 1, or 2".to_string());
        }
        let distinct_channels = [
            self.svr_channel,
            self.plc_channel,
            self.rtu_channel,
            self.crd_channel,
            self.pkt_channel,
        ];
        for i in 0..distinct_channels.len() {
            for j in (i + 1)..distinct_channels.len() {
                if distinct_channels[i] == distinct_channels[j] {
                    return Err("SVR/PLC/RTU/CRD/PKT channels must all be distinct".to_string());
                }
            }
        }
        Ok(())
    }

    /// Localized operator-facing strings, keyed by a stable id. Stubbed as a
    /// single built-in table here; a real deployment would load this from
    /// disk alongside the settings blob. See [`crate::core::localize`].
    pub fn translation_table(&self) -> HashMap<&'static str, &'static str> {
        crate::core::localize::default_table()
    }
}
