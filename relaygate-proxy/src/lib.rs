//! Relaygate Proxy Engine
//!
//! The Tokio side of the gateway: backend discovery, the latency prober, the
//! UDP relay loop and the environment configuration that wires them up.

pub mod config;
pub mod discovery;
pub mod error;
pub mod health_check;
pub mod server;
pub mod shutdown;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use server::Gateway;
