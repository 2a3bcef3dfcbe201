//! Relaygate Proxy Engine
//!
//! Starts the prober, the UDP gateway and the status API, then waits for a
//! termination signal and drains all three before exiting.

#![deny(missing_docs)]

use std::sync::Arc;

use relaygate_admin::StatusServer;
use relaygate_core::{ForwardingTable, LatencyTable};
use relaygate_proxy::discovery::Discovery;
use relaygate_proxy::health_check::prober::Prober;
use relaygate_proxy::{shutdown, Gateway, GatewayConfig, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The primary entrypoint for the Relaygate UDP gateway.
#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = GatewayConfig::from_env()?;
    info!(
        discovery = ?config.discovery,
        udp = %config.udp_addr,
        api = %config.api_addr,
        "Starting Relaygate"
    );

    let latency = Arc::new(LatencyTable::new());
    let forwarding = Arc::new(ForwardingTable::new(config.forwarding_max_entries));

    let discovery = Discovery::from_mode(&config.discovery, config.discovery_timeout)?;
    let prober = Prober::bind(discovery, latency.clone(), config.probe).await?;
    let gateway = Gateway::bind(config.udp_addr, latency.clone(), forwarding).await?;
    let status = StatusServer::bind(config.api_addr, latency).await?;

    let token = CancellationToken::new();
    let prober = prober.spawn(token.clone());
    let gateway = gateway.spawn(token.clone());
    let status = status.spawn(token.clone());

    shutdown::cancel_on_signal(token).await;

    let (prober, gateway, status) = tokio::join!(prober, gateway, status);
    for (name, joined) in [("prober", prober), ("gateway", gateway)] {
        if let Err(e) = joined {
            error!(task = name, error = %e, "Task ended abnormally");
        }
    }
    match status {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Status API failed"),
        Err(e) => error!(task = "status", error = %e, "Task ended abnormally"),
    }

    info!("Shutting down gracefully.");
    Ok(())
}
