//! DNS-based discovery: every address behind a name is a backend.

use std::net::SocketAddr;
use std::time::Duration;

use relaygate_core::Candidates;
use tokio::net::lookup_host;
use tracing::{debug, error};

use super::Discover;
use crate::error::DiscoveryError;

/// Resolves a fixed name and pairs each address with a static port.
///
/// The resolved IP doubles as the backend identity. Only IPv4 addresses are
/// kept, matching the gateway's sockets.
#[derive(Debug, Clone)]
pub struct DnsDiscovery {
    name: String,
    port: u16,
    timeout: Duration,
}

impl DnsDiscovery {
    /// Create a resolver-backed discovery for `name`.
    pub fn new(name: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            port,
            timeout,
        }
    }

    async fn resolve(&self) -> Result<Candidates, DiscoveryError> {
        let lookup = lookup_host((self.name.as_str(), self.port));
        let addrs = tokio::time::timeout(self.timeout, lookup)
            .await
            .map_err(|_| DiscoveryError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|source| DiscoveryError::Resolve {
                name: self.name.clone(),
                source,
            })?;

        Ok(addrs
            .filter(SocketAddr::is_ipv4)
            .map(|addr| (addr.ip().to_string(), addr))
            .collect())
    }
}

impl Discover for DnsDiscovery {
    async fn discover(&self) -> Candidates {
        match self.resolve().await {
            Ok(candidates) => {
                debug!(name = %self.name, found = candidates.len(), "DNS discovery complete");
                candidates
            }
            Err(e) => {
                error!(name = %self.name, error = %e, "DNS discovery failed");
                Candidates::new()
            }
        }
    }
}
