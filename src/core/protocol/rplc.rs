// src/core/protocol/rplc.rs

//! RPLC (reactor PLC link) messages (spec.md §4.3, §6).

use crate::core::errors::ScadaError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkAckReason {
    Allow,
    Deny,
    Collision,
    BadVersion,
}

impl LinkAckReason {
    /// The metric-label spelling used by
    /// [`crate::core::metrics::SESSION_ESTABLISH_TOTAL`].
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkAckReason::Allow => "allow",
            LinkAckReason::Deny => "deny",
            LinkAckReason::Collision => "collision",
            LinkAckReason::BadVersion => "bad_version",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlcRole {
    Reactor,
}

/// A reactor's reported telemetry, the `db` record referenced by spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ReactorTelemetry {
    pub temperature: f64,
    pub damage_percent: f64,
    pub waste_fill_percent: f64,
    pub coolant_fill_percent: f64,
    pub fuel_fill_percent: f64,
    pub heating_rate_mb_t: f64,
    pub burn_rate_mb_t: f64,
    pub act_burn_rate_mb_t: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpsStatus {
    pub tripped: bool,
    pub force_disabled: bool,
    /// Bitmask over the standard RPS trip causes (high temp, high damage,
    /// high waste, low coolant, low fuel, fault, timeout, manual).
    pub trip_causes: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RplcMessage {
    LinkReq {
        version: u16,
        reactor_id: u32,
        role: PlcRole,
    },
    LinkAck {
        reason: LinkAckReason,
    },
    Status {
        telemetry: ReactorTelemetry,
    },
    RpsStatus {
        status: RpsStatus,
    },
    RpsAlarm {
        trip_causes: u8,
    },
    Command {
        set_burn_rate: Option<f64>,
        scram: bool,
        reset_rps: bool,
        set_waste: Option<WasteMode>,
    },
    TelemetryDelta {
        telemetry: ReactorTelemetry,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WasteMode {
    Auto,
    Manual,
    AntimatterPlacement,
}

pub fn decode(bytes: &[u8]) -> Result<RplcMessage, ScadaError> {
    let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(msg)
}

pub fn encode(msg: &RplcMessage) -> Result<Vec<u8>, ScadaError> {
    Ok(bincode::serde::encode_to_vec(msg, bincode::config::standard())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_link_req() {
        let msg = RplcMessage::LinkReq {
            version: 7,
            reactor_id: 2,
            role: PlcRole::Reactor,
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn round_trips_a_command() {
        let msg = RplcMessage::Command {
            set_burn_rate: Some(5.0),
            scram: false,
            reset_rps: false,
            set_waste: Some(WasteMode::Auto),
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(decode(&bytes).unwrap(), msg);
    }
}
