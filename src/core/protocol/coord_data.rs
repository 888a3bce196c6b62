// src/core/protocol/coord_data.rs

//! COORD_DATA / API messages exchanged with the Coordinator and Pocket
//! peers (spec.md §4.5, §6). These carry operator requests in and
//! facility/unit telemetry frames out.

use crate::core::errors::ScadaError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoControlMode {
    Inactive,
    Monitored,
    BurnRate,
    Charge,
    GenRate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoStartConfig {
    pub mode: AutoControlMode,
    pub burn_target: f64,
    pub charge_setpoint: f64,
    pub gen_rate_setpoint: f64,
    pub limits: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FacilityCmd {
    AutoStart(AutoStartConfig),
    AutoStop,
    Ack,
    SetGroup { unit_id: u32, group: u8 },
    SetWaste { unit_id: u32, mode: super::rplc::WasteMode },
    SetPuFallback(bool),
    SetSpsLowPower(bool),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum UnitCmd {
    Scram,
    ResetRps,
    Ack { alarm_index: u8 },
    BurnRate(f64),
    Waste(super::rplc::WasteMode),
    Group(u8),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacilityStatusFrame {
    pub mode: AutoControlMode,
    pub status_text: [String; 3],
    pub tones: [bool; 8],
    pub ascram: bool,
    pub ascram_reason: Option<String>,
    pub avg_charge: f64,
    pub avg_inflow: f64,
    pub avg_outflow: f64,
    pub avg_net: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitStatusFrame {
    pub unit_id: u32,
    pub plc_linked: bool,
    pub ready: bool,
    pub burn_target_100: u32,
    pub requested_burn_100: u32,
    pub alarm_states: [u8; 16],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CoordDataMessage {
    FacBuilds { unit_count: u8 },
    FacStatus(FacilityStatusFrame),
    FacCmd(FacilityCmd),
    UnitBuilds { unit_id: u32, boilers: u8, turbines: u8 },
    UnitStatus(UnitStatusFrame),
    UnitCmd { unit_id: u32, cmd: UnitCmd },
}

pub fn decode(bytes: &[u8]) -> Result<CoordDataMessage, ScadaError> {
    let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(msg)
}

pub fn encode(msg: &CoordDataMessage) -> Result<Vec<u8>, ScadaError> {
    Ok(bincode::serde::encode_to_vec(msg, bincode::config::standard())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_auto_start_command() {
        let msg = CoordDataMessage::FacCmd(FacilityCmd::AutoStart(AutoStartConfig {
            mode: AutoControlMode::BurnRate,
            burn_target: 5.0,
            charge_setpoint: 0.0,
            gen_rate_setpoint: 0.0,
            limits: vec![10.0],
        }));
        let bytes = encode(&msg).unwrap();
        assert_eq!(decode(&bytes).unwrap(), msg);
    }
}
