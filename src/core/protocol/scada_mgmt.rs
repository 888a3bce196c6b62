// src/core/protocol/scada_mgmt.rs

//! SCADA_MGMT session-lifecycle messages (spec.md §4.2, §4.4, §6).

use crate::core::errors::ScadaError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RtuUnitTypeWire {
    BoilerValve,
    TurbineValve,
    DynamicValve,
    Imatrix,
    Sps,
    Sna,
    EnvDetector,
    Redstone,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvertisedUnit {
    pub kind: RtuUnitTypeWire,
    pub name: String,
    pub index: u32,
    pub reactor: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvertRejectReason {
    BadReactorId,
    DuplicateImatrix,
    DuplicateSps,
    BoilerIndexOutOfRange,
    TurbineIndexOutOfRange,
}

/// Which kind of session an `Establish` handshake is opening. PLCs instead
/// establish via `RplcMessage::LinkReq` (they need to carry a reactor id in
/// the same message); every other peer kind opens over `SCADA_MGMT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstablishRole {
    Rtu,
    Coord,
    Pocket,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ScadaMgmtMessage {
    Establish {
        version: u16,
        role: EstablishRole,
    },
    KeepAlive,
    Close,
    RtuAdvert {
        units: Vec<AdvertisedUnit>,
    },
    /// Reply to `RtuAdvert`, carrying per-entry uids for accepted units and
    /// the reasons for any rejected ones.
    RtuAdvertAck {
        accepted_uids: Vec<u32>,
        rejected: Vec<(u32, AdvertRejectReason)>,
    },
    Remounted {
        uid: u32,
    },
    DiagToneTest {
        test_tone_states: [bool; 8],
    },
    DiagAlarmTest {
        alarm_index: u8,
        enabled: bool,
    },
}

pub fn decode(bytes: &[u8]) -> Result<ScadaMgmtMessage, ScadaError> {
    let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(msg)
}

pub fn encode(msg: &ScadaMgmtMessage) -> Result<Vec<u8>, ScadaError> {
    Ok(bincode::serde::encode_to_vec(msg, bincode::config::standard())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_rtu_advert() {
        let msg = ScadaMgmtMessage::RtuAdvert {
            units: vec![AdvertisedUnit {
                kind: RtuUnitTypeWire::Imatrix,
                name: "ind1".into(),
                index: 1,
                reactor: 0,
            }],
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(decode(&bytes).unwrap(), msg);
    }
}
