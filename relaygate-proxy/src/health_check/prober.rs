//! Background prober for active UDP latency checks.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use relaygate_core::domain::envelope::{is_probe_ack, LATENCY_PROBE};
use relaygate_core::{LatencyEntry, SharedLatencyTable};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::discovery::Discover;

/// Prober timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Delay before the first cycle, letting the backend pool settle.
    pub warmup: Duration,
    /// Time between the start of consecutive cycles.
    pub interval: Duration,
    /// How long a single probe waits for `PROBE_ACK`.
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(15),
            interval: Duration::from_secs(10),
            timeout: Duration::from_millis(1000),
        }
    }
}

/// Why a single probe produced no measurement.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// No `PROBE_ACK` from the candidate within the timeout.
    #[error("probe timed out")]
    Timeout,

    /// The socket refused to send or receive.
    #[error("probe transport error: {0}")]
    Io(#[from] io::Error),
}

/// Keeps the latency table in step with discovery and measured RTTs.
pub struct Prober<D> {
    discovery: D,
    table: SharedLatencyTable,
    config: ProbeConfig,
    socket: UdpSocket,
}

impl<D: Discover + 'static> Prober<D> {
    /// Create a prober with its own ephemeral UDP socket.
    pub async fn bind(
        discovery: D,
        table: SharedLatencyTable,
        config: ProbeConfig,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await?;
        Ok(Self {
            discovery,
            table,
            config,
            socket,
        })
    }

    /// Spawns the probe loop as a background Tokio task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run cycles until `shutdown` is cancelled. The socket is released on return.
    pub async fn run(self, shutdown: CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = time::sleep(self.config.warmup) => {}
        }
        info!("Latency prober started");

        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.run_cycle(&shutdown).await;
        }
        info!("Latency prober stopped");
    }

    /// One discovery-and-measure pass.
    ///
    /// Candidates are probed one after another; a cancelled `shutdown` stops
    /// the pass between probes.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) {
        let candidates = self.discovery.discover().await;

        let stale = self.table.retain_discovered(&candidates);
        if candidates.is_empty() {
            warn!("No signaling nodes discovered, latency table cleared");
        }
        for node in &stale {
            info!(node = %node, "Evicted node no longer reported healthy");
        }

        for (node, addr) in &candidates {
            if shutdown.is_cancelled() {
                return;
            }
            match self.probe(*addr).await {
                Ok(rtt_ms) => {
                    debug!(node = %node, addr = %addr, rtt_ms, "Latency measured");
                    self.table.upsert(node, LatencyEntry::new(rtt_ms, *addr));
                }
                Err(ProbeError::Timeout) => {
                    warn!(node = %node, addr = %addr, "Latency probe timed out");
                    self.table.remove(node);
                }
                Err(e) => {
                    error!(node = %node, addr = %addr, error = %e, "Error probing node");
                }
            }
        }
    }

    /// Send one probe to `addr` and time the matching acknowledgement.
    ///
    /// Anything already queued on the socket (late acks of timed-out probes)
    /// is discarded first. Datagrams from other senders, or with any payload
    /// other than `PROBE_ACK`, are skipped while the deadline runs.
    pub async fn probe(&self, addr: SocketAddr) -> Result<f64, ProbeError> {
        let mut buf = [0u8; 64];
        self.discard_queued(&mut buf);

        let started = Instant::now();
        let deadline = started + self.config.timeout;
        self.socket.send_to(LATENCY_PROBE, addr).await?;

        loop {
            let (len, from) = time::timeout_at(deadline, self.socket.recv_from(&mut buf))
                .await
                .map_err(|_| ProbeError::Timeout)??;
            if from == addr && is_probe_ack(&buf[..len]) {
                return Ok(started.elapsed().as_secs_f64() * 1000.0);
            }
            debug!(expected = %addr, from = %from, "Ignoring unexpected probe response");
        }
    }

    fn discard_queued(&self, buf: &mut [u8]) {
        loop {
            match self.socket.try_recv_from(buf) {
                Ok((_, from)) => debug!(from = %from, "Discarding stale probe response"),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!(error = %e, "Error draining probe socket");
                    break;
                }
            }
        }
    }
}
