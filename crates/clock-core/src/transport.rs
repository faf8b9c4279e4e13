//! Transport contract (C6): the only I/O boundary the engines depend on.
//!
//! Two concrete implementations exist, both wire-compatible: [`crate::transport_raw::RawSocketTransport`]
//! (a `socket2`-based hot-path implementation mirroring the reference codebase's
//! `ShredReceiver`) and [`crate::transport_tokio::TokioTransport`] (an async implementation
//! built on `tokio::net::UdpSocket`). Engines (C4/C5) are written against this
//! trait and never reach for a socket directly.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ClockError;

/// Multicast group used by both roles, per the external interface contract.
pub const MULTICAST_ADDR: &str = "238.10.50.50";
pub const MULTICAST_PORT: u16 = 5000;
/// Outbound multicast TTL: local subnet(s) only.
pub const MULTICAST_TTL: u32 = 4;

/// Selects which concrete [`Transport`] implementation an engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// `socket2`/`libc`-based raw datagram sockets. Default.
    #[default]
    Raw,
    /// `tokio::net::UdpSocket`-based asynchronous transport.
    Tokio,
}

impl std::str::FromStr for TransportKind {
    type Err = ClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(TransportKind::Raw),
            "tokio" => Ok(TransportKind::Tokio),
            other => Err(ClockError::Config(format!("unknown transport '{}' (want raw|tokio)", other))),
        }
    }
}

/// A received datagram and the address it arrived from.
pub struct Received {
    pub bytes: Vec<u8>,
    pub from: SocketAddr,
}

/// The I/O boundary the engines are written against (§4.6).
///
/// Implementations own a bound UDP endpoint, multicast group membership, and
/// the outbound multicast options (TTL, loopback, interface).
pub trait Transport: Send {
    /// Sends `payload` to `dest` (unicast or multicast).
    fn send_to(&self, payload: &[u8], dest: SocketAddr) -> Result<(), ClockError>;

    /// Blocks for up to `timeout` waiting for the next datagram. Returns `Ok(None)`
    /// on a timeout (no datagram arrived), matching the raw-socket server's
    /// short non-blocking receive window (§5).
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Received>, ClockError>;

    /// Blocks indefinitely for the next datagram.
    fn recv(&self) -> Result<Received, ClockError>;
}
