//! Relaygate Core functionality.
//!
//! This crate contains the shared state that powers the Relaygate UDP gateway:
//! the latency table written by the prober, the forwarding table that routes
//! backend replies back to clients, the request envelope, and the
//! minimum-RTT selector. It performs no I/O.

pub mod domain;
pub mod load_balancer;

pub use domain::backend::{Candidates, LatencyEntry};
pub use domain::forwarding::{ForwardingEntry, ForwardingTable, SharedForwardingTable};
pub use domain::latency::{LatencyTable, SharedLatencyTable};
pub use load_balancer::selector::Selection;
