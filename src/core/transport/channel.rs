// src/core/transport/channel.rs

//! In-memory transport for tests: datagrams sent to a registered peer
//! address are delivered straight into that peer's inbound queue, with no
//! actual socket involved. Mirrors the teacher's habit of keeping
//! connection-handling logic testable against an in-process double rather
//! than only against real sockets.

use super::{DatagramTransport, Inbound};
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// A shared registry mapping socket addresses to the transport instance
/// bound there, so one `ChannelTransport::send` can find the peer's queue.
#[derive(Default, Clone)]
pub struct ChannelNetwork {
    peers: Arc<DashMap<SocketAddr, mpsc::UnboundedSender<Inbound>>>,
}

pub struct ChannelTransport {
    local_addr: SocketAddr,
    network: ChannelNetwork,
    opened_channels: DashMap<u16, ()>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Inbound>>,
}

impl ChannelTransport {
    pub fn new(network: ChannelNetwork, local_addr: SocketAddr) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        network.peers.insert(local_addr, tx);
        Self {
            local_addr,
            network,
            opened_channels: DashMap::new(),
            inbound_rx: Mutex::new(rx),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl DatagramTransport for ChannelTransport {
    async fn open(&self, channel: u16) -> std::io::Result<()> {
        self.opened_channels.insert(channel, ());
        Ok(())
    }

    async fn send(&self, dst_addr: SocketAddr, bytes: &[u8]) -> std::io::Result<()> {
        let Some(peer) = self.network.peers.get(&dst_addr) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("no registered peer at {dst_addr}"),
            ));
        };
        let inbound = Inbound {
            src_addr: self.local_addr,
            dst_channel: dst_addr.port(),
            payload: bytes.to_vec(),
            distance: 0,
        };
        peer.send(inbound)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone"))
    }

    async fn recv(&self) -> std::io::Result<Inbound> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "transport closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_a_datagram_between_two_registered_peers() {
        let network = ChannelNetwork::default();
        let a_addr: SocketAddr = "127.0.0.1:16240".parse().unwrap();
        let b_addr: SocketAddr = "127.0.0.1:16241".parse().unwrap();
        let a = ChannelTransport::new(network.clone(), a_addr);
        let b = ChannelTransport::new(network.clone(), b_addr);
        a.open(16240).await.unwrap();
        b.open(16241).await.unwrap();

        b.send(a_addr, b"hello").await.unwrap();
        let inbound = a.recv().await.unwrap();
        assert_eq!(inbound.payload, b"hello");
        assert_eq!(inbound.src_addr, b_addr);
    }
}
