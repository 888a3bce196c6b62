// src/core/protocol/modbus.rs

//! MODBUS-over-datagram request/reply PDUs (spec.md §6).

use crate::core::errors::ScadaError;
use serde::{Deserialize, Serialize};

/// The subset of standard MODBUS function codes the RTU/PLC fleet uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoil = 1,
    ReadInputDiscrete = 2,
    ReadHoldingRegister = 3,
    ReadInputRegister = 4,
    WriteSingleCoil = 5,
    WriteSingleHoldingRegister = 6,
    WriteMultiCoil = 15,
    WriteMultiHoldingRegister = 16,
}

impl FunctionCode {
    pub fn from_u8(v: u8) -> Result<Self, ScadaError> {
        Ok(match v {
            1 => Self::ReadCoil,
            2 => Self::ReadInputDiscrete,
            3 => Self::ReadHoldingRegister,
            4 => Self::ReadInputRegister,
            5 => Self::WriteSingleCoil,
            6 => Self::WriteSingleHoldingRegister,
            15 => Self::WriteMultiCoil,
            16 => Self::WriteMultiHoldingRegister,
            other => {
                return Err(ScadaError::Decode(format!(
                    "unknown MODBUS function code {other}"
                )));
            }
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModbusRequest {
    pub unit_id: u16,
    pub function: FunctionCode,
    pub start_addr: u16,
    /// Quantity of coils/registers for read requests, or the register/coil
    /// values to write for write requests.
    pub data: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModbusReply {
    pub unit_id: u16,
    pub function: FunctionCode,
    pub values: Vec<u16>,
    pub exception: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ModbusPdu {
    Request(ModbusRequest),
    Reply(ModbusReply),
}

pub fn decode(bytes: &[u8]) -> Result<ModbusPdu, ScadaError> {
    let (pdu, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(pdu)
}

pub fn encode(pdu: &ModbusPdu) -> Result<Vec<u8>, ScadaError> {
    Ok(bincode::serde::encode_to_vec(pdu, bincode::config::standard())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_read_holding_register_request() {
        let pdu = ModbusPdu::Request(ModbusRequest {
            unit_id: 3,
            function: FunctionCode::ReadHoldingRegister,
            start_addr: 10,
            data: vec![4],
        });
        let bytes = encode(&pdu).unwrap();
        assert_eq!(decode(&bytes).unwrap(), pdu);
    }

    #[test]
    fn round_trips_a_reply_with_exception() {
        let pdu = ModbusPdu::Reply(ModbusReply {
            unit_id: 3,
            function: FunctionCode::WriteSingleCoil,
            values: vec![],
            exception: Some(2),
        });
        let bytes = encode(&pdu).unwrap();
        assert_eq!(decode(&bytes).unwrap(), pdu);
    }

    #[test]
    fn rejects_unknown_function_code() {
        assert!(FunctionCode::from_u8(99).is_err());
    }
}
