//! Server module for the gateway's UDP relay loop.
//!
//! Every datagram is handled on its own: a datagram from a known backend is a
//! reply and goes back to the client last routed to that backend; anything
//! else is a request and goes, wrapped in the client-address envelope, to the
//! backend with the lowest RTT.

use std::io;
use std::net::SocketAddr;

use relaygate_core::domain::envelope;
use relaygate_core::{SharedForwardingTable, SharedLatencyTable};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Largest possible UDP payload.
const MAX_DATAGRAM: usize = 65_535;

/// The latency-steered relay.
pub struct Gateway {
    socket: UdpSocket,
    latency: SharedLatencyTable,
    forwarding: SharedForwardingTable,
}

impl Gateway {
    /// Bind the client-facing socket.
    pub async fn bind(
        addr: SocketAddr,
        latency: SharedLatencyTable,
        forwarding: SharedForwardingTable,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            latency,
            forwarding,
        })
    }

    /// The address the gateway is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns the relay loop as a background Tokio task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Relay datagrams until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "Gateway UDP server listening");
        }
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };
            match received {
                Ok((len, source)) => self.handle_datagram(&buf[..len], source).await,
                Err(e) => error!(error = %e, "Error in gateway UDP loop"),
            }
        }
        info!("Gateway UDP server stopped");
    }

    async fn handle_datagram(&self, data: &[u8], source: SocketAddr) {
        let result = if self.latency.is_backend(&source) {
            self.relay_reply(data, source).await
        } else {
            self.forward_request(data, source).await
        };
        if let Err(e) = result {
            error!(%source, error = %e, "Error relaying datagram");
        }
    }

    /// Send a backend's reply, unmodified, to the client it belongs to.
    async fn relay_reply(&self, data: &[u8], backend: SocketAddr) -> io::Result<()> {
        let Some(client) = self.forwarding.client_for(&backend) else {
            warn!(%backend, "Reply from backend has no forwarding entry, dropping");
            return Ok(());
        };
        debug!(%backend, %client, len = data.len(), "Relaying reply to client");
        self.socket.send_to(data, client).await?;
        Ok(())
    }

    /// Wrap a client request and send it to the fastest backend.
    async fn forward_request(&self, data: &[u8], client: SocketAddr) -> io::Result<()> {
        let Some(target) = self.latency.fastest() else {
            error!(%client, "No signaling service available, dropping message");
            return Ok(());
        };
        debug!(
            %client,
            node = %target.identity,
            backend = %target.addr,
            "Forwarding to fastest node"
        );

        self.socket.send_to(&envelope::encode(client, data), target.addr).await?;
        if let Some(evicted) = self.forwarding.insert(client, target.addr) {
            debug!(client = %evicted.client_addr, "Forwarding table full, evicted oldest entry");
        }
        Ok(())
    }
}
