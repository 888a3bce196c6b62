// src/core/transport/mod.rs

//! The datagram transport abstraction (spec.md §4.1, §6's "serial-capable
//! datagram transport"). The real supervisor sits on top of a transport
//! that exposes `open(channel)`, `send(dst, bytes)`, and a stream of
//! inbound datagrams; here that contract is a trait so the bulk of the
//! supervisor is testable against an in-memory fake, the same way the
//! teacher abstracts `AnyStream` over TCP/TLS so `ConnectionHandler` never
//! has to know which one it's talking to.

pub mod channel;
pub mod udp;

use async_trait::async_trait;
use std::net::SocketAddr;

/// One inbound datagram, carrying the logical channel it arrived on, who
/// sent it, and — for trusted-range enforcement — how far away the sender
/// claims to be (0 when the concept doesn't apply to a given transport).
#[derive(Debug, Clone)]
pub struct Inbound {
    pub src_addr: SocketAddr,
    pub dst_channel: u16,
    pub payload: Vec<u8>,
    pub distance: u32,
}

/// Abstracts the underlying network so the rest of the supervisor never
/// talks to a raw socket directly.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Binds/opens a logical channel for receiving. Implementations may
    /// treat channels as independent sockets or as a shared socket with
    /// channel-tagged framing; callers only rely on `recv` yielding
    /// datagrams addressed to a channel this side has opened.
    async fn open(&self, channel: u16) -> std::io::Result<()>;

    /// Sends `bytes` to `dst_addr`. The `dst_channel` is carried inside the
    /// frame payload itself (see [`crate::core::protocol::frame`]), not at
    /// the transport layer, mirroring how the original system multiplexes
    /// several logical peers over one physical link.
    async fn send(&self, dst_addr: SocketAddr, bytes: &[u8]) -> std::io::Result<()>;

    /// Receives the next inbound datagram addressed to any channel this
    /// side has opened.
    async fn recv(&self) -> std::io::Result<Inbound>;
}
