// src/core/errors.rs

//! Defines the primary error type for the entire supervisor.

use std::net::SocketAddr;
use thiserror::Error;

/// The main error enum, representing every failure kind the supervisor core
/// can encounter. `thiserror` gives us `Display`/`Error` and `From` impls for
/// free, mirroring how the teacher crate centralizes its error taxonomy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScadaError {
    /// A packet failed to decode. Dropped, logged at `debug!`. Never fatal.
    #[error("decode error: {0}")]
    Decode(String),

    /// HMAC mismatch, stale timestamp, or a sequence number replay.
    /// Dropped, logged at `warn!`.
    #[error("authentication error: {0}")]
    Auth(String),

    /// A structurally valid frame that violates protocol invariants (unknown
    /// protocol tag, dst channel mismatch, frame from a kind that doesn't
    /// match the session). Dropped, logged at `warn!`.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A `LINK_REQ` arrived for a reactor id that already has a live session.
    /// The sender receives `COLLISION`, logged at `warn!`.
    #[error("session collision for reactor {reactor_id}")]
    SessionCollision { reactor_id: u32 },

    /// A `LINK_REQ` carried a comms version the supervisor doesn't speak.
    /// The sender receives `BAD_VERSION`, logged at `warn!`.
    #[error("version mismatch: peer={peer}, supervisor={supervisor}")]
    VersionMismatch { peer: u16, supervisor: u16 },

    /// A session's watchdog fired. The session is closed, logged at `info!`.
    #[error("watchdog timeout for session {0}")]
    WatchdogTimeout(u64),

    /// An RTU unit entry's underlying multiblock reported a fault.
    /// `hw_state` becomes `Faulted`; the facility keeps running.
    #[error("device fault: {0}")]
    DeviceFault(String),

    /// An RTU unit entry's device was detached out-of-band.
    /// `hw_state` becomes `Offline`; the facility keeps running.
    #[error("device lost: {0}")]
    DeviceLost(String),

    /// A reconnecting device reported a hardware kind different from the one
    /// it was originally advertised as. Per the redesign in Design Notes
    /// this is an error, not an implicit retype.
    #[error("device kind mismatch on reconnect: expected {expected:?}, got {actual:?}")]
    DeviceKindMismatch { expected: String, actual: String },

    /// The loaded settings blob failed validation. Startup is refused; the
    /// caller must route the operator to the configurator.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Unrecoverable. Logged at `error!` and the process exits.
    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("unknown reactor unit id: {0}")]
    UnknownUnit(u32),

    #[error("no session for address {0}")]
    NoSuchSession(SocketAddr),

    #[error("operation invalid in current facility mode: {0}")]
    InvalidState(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ScadaError {
    fn from(e: std::io::Error) -> Self {
        ScadaError::Io(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for ScadaError {
    fn from(e: bincode::error::EncodeError) -> Self {
        ScadaError::Decode(format!("encode failure: {e}"))
    }
}

impl From<bincode::error::DecodeError> for ScadaError {
    fn from(e: bincode::error::DecodeError) -> Self {
        ScadaError::Decode(format!("decode failure: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, ScadaError>;
