//! Backend discovery.
//!
//! Discovery never fails from the caller's point of view: any registry or
//! resolver problem is logged and reported as an empty candidate set, which
//! the prober treats as "no healthy backends".

use std::future::Future;
use std::time::Duration;

use relaygate_core::Candidates;

use crate::config::DiscoveryMode;
use crate::error::DiscoveryError;

pub mod dns;
pub mod registry;

pub use dns::DnsDiscovery;
pub use registry::RegistryDiscovery;

/// A source of backend candidates.
pub trait Discover: Send + Sync {
    /// The current candidates, keyed by identity. Empty on failure.
    fn discover(&self) -> impl Future<Output = Candidates> + Send;
}

/// The discovery strategy selected at startup.
#[derive(Debug, Clone)]
pub enum Discovery {
    /// Health-catalog lookup over HTTP.
    Registry(RegistryDiscovery),
    /// DNS resolution of a well-known name.
    Dns(DnsDiscovery),
}

impl Discovery {
    /// Build the strategy named by `mode`, bounding every attempt by `timeout`.
    pub fn from_mode(mode: &DiscoveryMode, timeout: Duration) -> Result<Self, DiscoveryError> {
        Ok(match mode {
            DiscoveryMode::Registry {
                base_url,
                service,
                datacenter,
            } => Self::Registry(RegistryDiscovery::new(
                base_url,
                service,
                datacenter.as_deref(),
                timeout,
            )?),
            DiscoveryMode::Dns { name, port } => Self::Dns(DnsDiscovery::new(name, *port, timeout)),
        })
    }
}

impl Discover for Discovery {
    async fn discover(&self) -> Candidates {
        match self {
            Self::Registry(registry) => registry.discover().await,
            Self::Dns(dns) => dns.discover().await,
        }
    }
}
