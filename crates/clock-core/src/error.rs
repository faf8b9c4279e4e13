//! Fatal error types for the clock-sync engines.
//!
//! Per-datagram faults (bad length, bad checksum, filter mismatch) are never
//! represented here — they are silent drops handled inline in the receive
//! loops. `ClockError` covers only the failures that should abort startup or
//! surface as a logged, skipped operation.

use std::net::AddrParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("failed to parse multicast address: {0}")]
    AddrParse(#[from] AddrParseError),

    #[error("socket setup failed: {0}")]
    Socket(#[source] std::io::Error),

    #[error("failed to join multicast group: {0}")]
    MulticastJoin(#[source] std::io::Error),

    #[error("statistics file I/O failed: {0}")]
    StatsIo(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}
