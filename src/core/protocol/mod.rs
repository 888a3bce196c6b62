// src/core/protocol/mod.rs

//! The wire protocol stack: frame header/auth, and the four packet families
//! that travel inside a frame's payload.

pub mod coord_data;
pub mod frame;
pub mod modbus;
pub mod rplc;
pub mod scada_mgmt;

pub use frame::{Frame, ProtocolTag, decode_frame, encode_frame};

use crate::core::errors::ScadaError;
use serde::{Deserialize, Serialize};

/// The decoded payload of a frame, tagged by protocol family. Decoding a
/// frame's raw payload into one of these is pure: `bytes -> Packet |
/// DecodeError`, and never fatal to the owning session on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Packet {
    Modbus(modbus::ModbusPdu),
    Rplc(rplc::RplcMessage),
    ScadaMgmt(scada_mgmt::ScadaMgmtMessage),
    CoordData(coord_data::CoordDataMessage),
}

impl Packet {
    pub fn protocol_tag(&self) -> ProtocolTag {
        match self {
            Packet::Modbus(_) => ProtocolTag::Modbus,
            Packet::Rplc(_) => ProtocolTag::Rplc,
            Packet::ScadaMgmt(_) => ProtocolTag::ScadaMgmt,
            Packet::CoordData(_) => ProtocolTag::CoordData,
        }
    }

    /// Decodes a packet from a payload whose protocol family is already
    /// known from the frame header. Each protocol's own decoder is pure and
    /// independent; an error here never propagates past the caller as
    /// anything but a dropped packet.
    pub fn decode(tag: ProtocolTag, payload: &[u8]) -> Result<Self, ScadaError> {
        match tag {
            ProtocolTag::Modbus => modbus::decode(payload).map(Packet::Modbus),
            ProtocolTag::Rplc => rplc::decode(payload).map(Packet::Rplc),
            ProtocolTag::ScadaMgmt => scada_mgmt::decode(payload).map(Packet::ScadaMgmt),
            ProtocolTag::CoordData => coord_data::decode(payload).map(Packet::CoordData),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ScadaError> {
        match self {
            Packet::Modbus(p) => modbus::encode(p),
            Packet::Rplc(p) => rplc::encode(p),
            Packet::ScadaMgmt(p) => scada_mgmt::encode(p),
            Packet::CoordData(p) => coord_data::encode(p),
        }
    }
}
