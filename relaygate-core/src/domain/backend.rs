//! Backend (signaler) models.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::SystemTime;

/// The result of one discovery cycle: backend identity to address.
///
/// The identity is the node name in registry mode and the resolved IP in DNS
/// mode; the address may change from one cycle to the next.
pub type Candidates = BTreeMap<String, SocketAddr>;

/// Latest probe measurement for a backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyEntry {
    /// Round-trip time of the last successful probe, in milliseconds.
    pub rtt_ms: f64,
    /// The address that answered the probe.
    pub addr: SocketAddr,
    /// Wall-clock time of the last successful probe.
    pub last_seen: SystemTime,
}

impl LatencyEntry {
    /// Record a measurement taken now.
    pub fn new(rtt_ms: f64, addr: SocketAddr) -> Self {
        Self {
            rtt_ms,
            addr,
            last_seen: SystemTime::now(),
        }
    }
}
