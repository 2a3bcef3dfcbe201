//! Wire formats shared between the gateway and its backends.
//!
//! A forwarded request carries the original sender in front of the payload:
//! `"<client_ip>:<client_port>|"` followed by the raw datagram. Backends split
//! on the first `|` and parse the prefix from the right, so IPv6 hosts are
//! written without brackets.

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

/// Probe datagram sent by the gateway.
pub const LATENCY_PROBE: &[u8] = b"LATENCY_PROBE";

/// The only valid answer to [`LATENCY_PROBE`].
pub const PROBE_ACK: &[u8] = b"PROBE_ACK";

const DELIMITER: u8 = b'|';

/// Reasons an envelope cannot be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// No `|` separates the address prefix from the payload.
    #[error("missing '|' delimiter")]
    MissingDelimiter,

    /// The prefix is not a `host:port` pair.
    #[error("invalid sender prefix: {0:?}")]
    InvalidSender(String),
}

/// Prefix `payload` with the client's address.
pub fn encode(client: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let prefix = format!("{}:{}|", client.ip(), client.port());
    let mut out = Vec::with_capacity(prefix.len() + payload.len());
    out.extend_from_slice(prefix.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Split an envelope into the original sender and the payload.
pub fn decode(datagram: &[u8]) -> Result<(SocketAddr, &[u8]), EnvelopeError> {
    let split = datagram
        .iter()
        .position(|b| *b == DELIMITER)
        .ok_or(EnvelopeError::MissingDelimiter)?;
    let (prefix, rest) = datagram.split_at(split);
    let prefix = String::from_utf8_lossy(prefix);

    let invalid = || EnvelopeError::InvalidSender(prefix.to_string());
    let (host, port) = prefix.rsplit_once(':').ok_or_else(invalid)?;
    let ip: IpAddr = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .map_err(|_| invalid())?;
    let port: u16 = port.parse().map_err(|_| invalid())?;

    Ok((SocketAddr::new(ip, port), &rest[1..]))
}

/// Whether `datagram` is a valid probe answer.
pub fn is_probe_ack(datagram: &[u8]) -> bool {
    datagram == PROBE_ACK
}
