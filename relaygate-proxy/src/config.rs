//! Environment-driven gateway configuration.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use relaygate_core::domain::forwarding::DEFAULT_MAX_ENTRIES;
use thiserror::Error;

use crate::health_check::prober::ProbeConfig;

/// A configuration value that could not be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The variable is set but does not parse.
    #[error("invalid value {value:?} for {var}")]
    Invalid {
        /// Environment variable name
        var: &'static str,
        /// The rejected value
        value: String,
    },
}

/// How backend candidates are found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Query a Consul-style health catalog for passing instances.
    Registry {
        /// Base URL, e.g. `http://127.0.0.1:8500`
        base_url: String,
        /// Service to look up
        service: String,
        /// Optional datacenter scope
        datacenter: Option<String>,
    },
    /// Resolve a DNS name and pair every address with a fixed port.
    Dns {
        /// Name to resolve
        name: String,
        /// Port every backend listens on
        port: u16,
    },
}

/// Everything the gateway process needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// UDP address client traffic arrives on.
    pub udp_addr: SocketAddr,
    /// HTTP address of the status endpoint.
    pub api_addr: SocketAddr,
    /// Discovery strategy, fixed for the process lifetime.
    pub discovery: DiscoveryMode,
    /// Deadline for a single discovery attempt.
    pub discovery_timeout: Duration,
    /// Prober timings.
    pub probe: ProbeConfig,
    /// Forwarding table capacity.
    pub forwarding_max_entries: usize,
}

impl GatewayConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let udp_port: u16 = parse(&get, "GW_UDP_PORT", 5060)?;
        let api_port: u16 = parse(&get, "GW_API_PORT", 5061)?;

        let mode = get("DISCOVERY_MODE").unwrap_or_else(|| "consul".to_owned());
        let discovery = match mode.to_ascii_lowercase().as_str() {
            "consul" | "registry" => DiscoveryMode::Registry {
                base_url: get("CONSUL_HTTP_ADDR")
                    .unwrap_or_else(|| "http://127.0.0.1:8500".to_owned())
                    .trim_end_matches('/')
                    .to_owned(),
                service: get("SIGNALING_SERVICE").unwrap_or_else(|| "sip-signaling".to_owned()),
                datacenter: get("CONSUL_DATACENTER"),
            },
            "dns" => DiscoveryMode::Dns {
                name: get("SIGNALING_DNS_NAME").unwrap_or_else(|| "sip-signaling".to_owned()),
                port: parse(&get, "SIGNAL_UDP_PORT", 13024)?,
            },
            _ => {
                return Err(ConfigError::Invalid {
                    var: "DISCOVERY_MODE",
                    value: mode,
                })
            }
        };

        let defaults = ProbeConfig::default();
        let probe = ProbeConfig {
            warmup: Duration::from_secs(parse(
                &get,
                "PROBE_WARMUP_SECS",
                defaults.warmup.as_secs(),
            )?),
            interval: Duration::from_secs(parse(
                &get,
                "PROBE_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )?),
            timeout: Duration::from_millis(parse(
                &get,
                "PROBE_TIMEOUT_MS",
                defaults.timeout.as_millis() as u64,
            )?),
        };

        Ok(Self {
            udp_addr: SocketAddr::from(([0, 0, 0, 0], udp_port)),
            api_addr: SocketAddr::from(([0, 0, 0, 0], api_port)),
            discovery,
            discovery_timeout: Duration::from_millis(parse(&get, "DISCOVERY_TIMEOUT_MS", 2000)?),
            probe,
            forwarding_max_entries: parse(&get, "FORWARDING_MAX_ENTRIES", DEFAULT_MAX_ENTRIES)?,
        })
    }
}

fn parse<T, F>(get: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_match_deployment() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.udp_addr.port(), 5060);
        assert_eq!(cfg.api_addr.port(), 5061);
        assert_eq!(
            cfg.discovery,
            DiscoveryMode::Registry {
                base_url: "http://127.0.0.1:8500".into(),
                service: "sip-signaling".into(),
                datacenter: None,
            }
        );
        assert_eq!(cfg.discovery_timeout, Duration::from_secs(2));
        assert_eq!(cfg.probe, ProbeConfig::default());
        assert_eq!(cfg.forwarding_max_entries, DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn dns_mode_uses_static_port() {
        let cfg = config(&[
            ("DISCOVERY_MODE", "DNS"),
            ("SIGNALING_DNS_NAME", "signalers.internal"),
            ("SIGNAL_UDP_PORT", "14000"),
        ])
        .unwrap();
        assert_eq!(
            cfg.discovery,
            DiscoveryMode::Dns {
                name: "signalers.internal".into(),
                port: 14000,
            }
        );
    }

    #[test]
    fn registry_scope_and_trailing_slash() {
        let cfg = config(&[
            ("CONSUL_HTTP_ADDR", "http://consul:8500/"),
            ("CONSUL_DATACENTER", "eu-west"),
        ])
        .unwrap();
        let DiscoveryMode::Registry { base_url, datacenter, .. } = cfg.discovery else {
            panic!("expected registry mode");
        };
        assert_eq!(base_url, "http://consul:8500");
        assert_eq!(datacenter.as_deref(), Some("eu-west"));
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let cfg = config(&[("GW_UDP_PORT", ""), ("CONSUL_DATACENTER", "  ")]).unwrap();
        assert_eq!(cfg.udp_addr.port(), 5060);
        let DiscoveryMode::Registry { datacenter, .. } = cfg.discovery else {
            panic!("expected registry mode");
        };
        assert_eq!(datacenter, None);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert_eq!(
            config(&[("GW_UDP_PORT", "70000")]),
            Err(ConfigError::Invalid {
                var: "GW_UDP_PORT",
                value: "70000".into(),
            })
        );
        assert!(matches!(
            config(&[("DISCOVERY_MODE", "mdns")]),
            Err(ConfigError::Invalid { var: "DISCOVERY_MODE", .. })
        ));
    }
}
