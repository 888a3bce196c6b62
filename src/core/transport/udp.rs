// src/core/transport/udp.rs

//! Real transport: one `UdpSocket` per opened channel, fanned into a single
//! inbound queue. Grounded on the teacher's `server::stream::AnyStream`,
//! which wraps the concrete TCP/TLS type behind a trait object so the
//! accept loop never branches on it; here the same shape wraps one or more
//! `UdpSocket`s behind `DatagramTransport`.

use super::{DatagramTransport, Inbound};
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

pub struct UdpTransport {
    bind_addr: std::net::IpAddr,
    sockets: DashMap<u16, Arc<UdpSocket>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
}

impl UdpTransport {
    pub fn new(bind_addr: std::net::IpAddr) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            bind_addr,
            sockets: DashMap::new(),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        }
    }

}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn open(&self, channel: u16) -> std::io::Result<()> {
        if self.sockets.contains_key(&channel) {
            return Ok(());
        }
        let socket = Arc::new(UdpSocket::bind((self.bind_addr, channel)).await?);
        self.sockets.insert(channel, socket.clone());

        let tx = self.inbound_tx.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65536];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((n, src_addr)) => {
                        let payload = buf[..n].to_vec();
                        let inbound = Inbound {
                            src_addr,
                            dst_channel: channel,
                            payload,
                            distance: 0,
                        };
                        if tx.send(inbound).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(channel, error = %e, "udp recv_from failed");
                        break;
                    }
                }
            }
        });
        Ok(())
    }

    async fn send(&self, dst_addr: SocketAddr, bytes: &[u8]) -> std::io::Result<()> {
        // Any bound socket can originate the send; this fleet always opens
        // at least its own supervisor channel first.
        let socket = self
            .sockets
            .iter()
            .next()
            .map(|e| e.value().clone())
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotConnected, "no channel opened yet")
            })?;
        socket.send_to(bytes, dst_addr).await?;
        Ok(())
    }

    async fn recv(&self) -> std::io::Result<Inbound> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "transport closed"))
    }
}
