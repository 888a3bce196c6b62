// src/core/protocol/frame.rs

//! Frame header: channel addressing, protocol tag, sequence number, and the
//! optional HMAC that authenticates every outgoing datagram.
//!
//! Framing here is pure `bytes -> Frame | DecodeError` functions rather than
//! a `tokio_util::codec::Decoder`, because the underlying transport is
//! datagram-oriented: one `recv()` always yields exactly one complete frame,
//! so there is no partial-frame buffering to manage the way the teacher's
//! `RespFrameCodec` has to for a TCP byte stream.

use crate::core::errors::ScadaError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const MAGIC: [u8; 2] = *b"SV";
const WIRE_VERSION: u8 = 1;
const MAC_LEN: usize = 16;

/// The four protocol families a frame's payload can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolTag {
    Modbus = 0,
    Rplc = 1,
    ScadaMgmt = 2,
    CoordData = 3,
}

impl ProtocolTag {
    fn from_u8(v: u8) -> Result<Self, ScadaError> {
        match v {
            0 => Ok(ProtocolTag::Modbus),
            1 => Ok(ProtocolTag::Rplc),
            2 => Ok(ProtocolTag::ScadaMgmt),
            3 => Ok(ProtocolTag::CoordData),
            other => Err(ScadaError::ProtocolViolation(format!(
                "unknown protocol tag {other}"
            ))),
        }
    }

    /// The metric-label spelling used by [`crate::core::metrics`]'s
    /// packet-decode counters.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolTag::Modbus => "modbus",
            ProtocolTag::Rplc => "rplc",
            ProtocolTag::ScadaMgmt => "scada_mgmt",
            ProtocolTag::CoordData => "coord_data",
        }
    }
}

/// A single datagram's worth of framing: addressing, sequencing, and the
/// authenticated payload. Mirrors spec.md §3's abstract `Packet.frame`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub src_channel: u16,
    pub dst_channel: u16,
    pub protocol: ProtocolTag,
    pub seq: u32,
    pub timestamp_ms: u64,
    pub payload: Vec<u8>,
    pub mac: Option<[u8; MAC_LEN]>,
}

fn compute_mac(key: &[u8], seq: u32, protocol: ProtocolTag, payload: &[u8], ts: u64) -> [u8; MAC_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&seq.to_be_bytes());
    mac.update(&[protocol as u8]);
    mac.update(payload);
    mac.update(&ts.to_be_bytes());
    let full = mac.finalize().into_bytes();
    let mut truncated = [0u8; MAC_LEN];
    truncated.copy_from_slice(&full[..MAC_LEN]);
    truncated
}

/// Encodes a frame to its wire representation, computing and appending an
/// HMAC if `auth_key` is configured.
pub fn encode_frame(frame: &Frame, auth_key: Option<&[u8]>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24 + frame.payload.len() + MAC_LEN);
    buf.extend_from_slice(&MAGIC);
    buf.push(WIRE_VERSION);
    buf.push(frame.protocol as u8);
    buf.extend_from_slice(&frame.src_channel.to_be_bytes());
    buf.extend_from_slice(&frame.dst_channel.to_be_bytes());
    buf.extend_from_slice(&frame.seq.to_be_bytes());
    buf.extend_from_slice(&frame.timestamp_ms.to_be_bytes());
    buf.extend_from_slice(&(frame.payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&frame.payload);

    if let Some(key) = auth_key {
        let mac = compute_mac(key, frame.seq, frame.protocol, &frame.payload, frame.timestamp_ms);
        buf.push(1);
        buf.extend_from_slice(&mac);
    } else {
        buf.push(0);
    }
    buf
}

/// Decodes a raw datagram into a [`Frame`], without yet checking
/// authentication, freshness, or sequencing — those are the session
/// registry's job (spec.md §4.1) since they require peer state.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, ScadaError> {
    if bytes.len() < 2 + 1 + 1 + 2 + 2 + 4 + 8 + 4 {
        return Err(ScadaError::Decode("frame shorter than header".into()));
    }
    if bytes[0..2] != MAGIC {
        return Err(ScadaError::Decode("bad magic".into()));
    }
    let mut pos = 2;
    let version = bytes[pos];
    pos += 1;
    if version != WIRE_VERSION {
        return Err(ScadaError::Decode(format!("unsupported wire version {version}")));
    }
    let protocol = ProtocolTag::from_u8(bytes[pos])?;
    pos += 1;
    let src_channel = u16::from_be_bytes(bytes[pos..pos + 2].try_into().unwrap());
    pos += 2;
    let dst_channel = u16::from_be_bytes(bytes[pos..pos + 2].try_into().unwrap());
    pos += 2;
    let seq = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap());
    pos += 4;
    let timestamp_ms = u64::from_be_bytes(bytes[pos..pos + 8].try_into().unwrap());
    pos += 8;
    let payload_len = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
    pos += 4;

    if bytes.len() < pos + payload_len + 1 {
        return Err(ScadaError::Decode("frame truncated before payload/mac".into()));
    }
    let payload = bytes[pos..pos + payload_len].to_vec();
    pos += payload_len;

    let has_mac = bytes[pos];
    pos += 1;
    let mac = match has_mac {
        0 => None,
        1 => {
            if bytes.len() < pos + MAC_LEN {
                return Err(ScadaError::Decode("frame truncated before mac bytes".into()));
            }
            let mut m = [0u8; MAC_LEN];
            m.copy_from_slice(&bytes[pos..pos + MAC_LEN]);
            Some(m)
        }
        other => return Err(ScadaError::Decode(format!("bad mac-present flag {other}"))),
    };

    Ok(Frame {
        src_channel,
        dst_channel,
        protocol,
        seq,
        timestamp_ms,
        payload,
        mac,
    })
}

/// Verifies a decoded frame's authentication, replay window, and freshness.
/// `last_seq` is the highest sequence number previously accepted from this
/// peer; `replay_window` allows modest out-of-order delivery without
/// accepting a true replay.
pub fn verify_frame(
    frame: &Frame,
    auth_key: Option<&[u8]>,
    last_seq: Option<u32>,
    replay_window: u32,
    now_ms: u64,
    max_skew: Duration,
) -> Result<(), ScadaError> {
    if let Some(key) = auth_key {
        let expected = compute_mac(key, frame.seq, frame.protocol, &frame.payload, frame.timestamp_ms);
        match frame.mac {
            Some(mac) if mac == expected => {}
            _ => return Err(ScadaError::Auth("HMAC mismatch".into())),
        }
    }

    if let Some(last) = last_seq
        && frame.seq + replay_window < last
    {
        return Err(ScadaError::Auth(format!(
            "sequence regression: got {}, last accepted {}",
            frame.seq, last
        )));
    }

    let skew = now_ms.abs_diff(frame.timestamp_ms);
    if skew > max_skew.as_millis() as u64 {
        return Err(ScadaError::Auth(format!(
            "clock skew {skew}ms exceeds max {}ms",
            max_skew.as_millis()
        )));
    }

    Ok(())
}
