//! Domain state shared by the gateway loops.

pub mod backend;
pub mod envelope;
pub mod forwarding;
pub mod latency;
