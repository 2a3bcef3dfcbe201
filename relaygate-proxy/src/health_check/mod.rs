//! Backend latency probing.

pub mod prober;
