//! Health-catalog discovery (Consul `/v1/health/service` API).

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use relaygate_core::Candidates;
use serde::Deserialize;
use tokio::net::lookup_host;
use tracing::{debug, error, warn};

use super::Discover;
use crate::error::DiscoveryError;

/// One entry of the health endpoint's response array.
#[derive(Debug, Deserialize)]
struct ServiceInstance {
    #[serde(rename = "Node")]
    node: NodeInfo,
    #[serde(rename = "Service")]
    service: ServiceInfo,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    #[serde(rename = "Node")]
    name: String,
    #[serde(rename = "Address")]
    address: String,
}

#[derive(Debug, Deserialize)]
struct ServiceInfo {
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
}

impl ServiceInstance {
    /// The service address, falling back to the node's.
    fn host(&self) -> &str {
        if self.service.address.is_empty() {
            &self.node.address
        } else {
            &self.service.address
        }
    }
}

/// Queries the registry for instances in the `passing` state.
#[derive(Debug, Clone)]
pub struct RegistryDiscovery {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RegistryDiscovery {
    /// Create a registry client for `service`, optionally scoped to `datacenter`.
    pub fn new(
        base_url: &str,
        service: &str,
        datacenter: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, DiscoveryError> {
        let mut url = format!(
            "{}/v1/health/service/{}?passing",
            base_url.trim_end_matches('/'),
            service
        );
        if let Some(dc) = datacenter {
            url.push_str("&dc=");
            url.push_str(dc);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    /// The health endpoint queried on every cycle.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Candidates, DiscoveryError> {
        let instances: Vec<ServiceInstance> = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resolve_instances(instances).await)
    }
}

/// Turn catalog entries into candidates, resolving hostnames where needed.
///
/// Only IPv4 addresses are usable by the gateway's sockets; instances without
/// one are skipped.
async fn resolve_instances(instances: Vec<ServiceInstance>) -> Candidates {
    let mut candidates = Candidates::new();
    for instance in instances {
        let host = instance.host();
        let port = instance.service.port;

        let addr = match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => Some(SocketAddr::from((ip, port))),
            Ok(IpAddr::V6(_)) => None,
            Err(_) => match lookup_host((host, port)).await {
                Ok(mut addrs) => addrs.find(SocketAddr::is_ipv4),
                Err(e) => {
                    let node = &instance.node.name;
                    warn!(%node, host, error = %e, "Cannot resolve instance address");
                    None
                }
            },
        };

        match addr {
            Some(addr) => {
                candidates.insert(instance.node.name.clone(), addr);
            }
            None => {
                let node = &instance.node.name;
                warn!(%node, host, "Skipping instance without an IPv4 address");
            }
        }
    }
    candidates
}

impl Discover for RegistryDiscovery {
    async fn discover(&self) -> Candidates {
        let attempt = tokio::time::timeout(self.timeout, self.fetch()).await;
        match attempt {
            Ok(Ok(candidates)) => {
                debug!(url = %self.url, found = candidates.len(), "Registry discovery complete");
                candidates
            }
            Ok(Err(e)) => {
                error!(url = %self.url, error = %e, "Error querying registry");
                Candidates::new()
            }
            Err(_) => {
                let e = DiscoveryError::Timeout(self.timeout.as_millis() as u64);
                error!(url = %self.url, error = %e, "Error querying registry");
                Candidates::new()
            }
        }
    }
}
