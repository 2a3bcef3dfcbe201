//! Load Balancing Selector logic

use std::cmp::Ordering;
use std::net::SocketAddr;

use crate::domain::backend::LatencyEntry;

/// The backend chosen for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Identity of the chosen backend.
    pub identity: String,
    /// Address the request is forwarded to.
    pub addr: SocketAddr,
}

/// Selects the backend with the lowest measured RTT.
///
/// Equal RTTs are broken by the lexicographically smallest identity, so the
/// outcome never depends on the iteration order of `entries`.
pub fn select_fastest<'a, I>(entries: I) -> Option<Selection>
where
    I: IntoIterator<Item = (&'a str, &'a LatencyEntry)>,
{
    entries
        .into_iter()
        .min_by(|(id_a, a), (id_b, b)| rank(a.rtt_ms, id_a, b.rtt_ms, id_b))
        .map(|(identity, entry)| Selection {
            identity: identity.to_owned(),
            addr: entry.addr,
        })
}

fn rank(rtt_a: f64, id_a: &str, rtt_b: f64, id_b: &str) -> Ordering {
    rtt_a.total_cmp(&rtt_b).then_with(|| id_a.cmp(id_b))
}
