//! Client engine (C4): joins the multicast group, stamps arrivals, replies.

use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ClockError;
use crate::transport::{Transport, TransportKind, MULTICAST_PORT};
use crate::transport_raw::RawSocketTransport;
use crate::transport_tokio::TokioTransport;
use crate::wire::{now_micros, SyncRecord};

/// `(client_id, optional filter clock_id)`. A filter of 0 means "respond to all servers".
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    pub client_id: u32,
    pub filter_clock_id: u32,
}

pub struct ClientEngine {
    config: ClientConfig,
    transport: Box<dyn Transport>,
}

impl ClientEngine {
    pub fn start(config: ClientConfig, kind: TransportKind, interface: Option<Ipv4Addr>) -> Result<Self, ClockError> {
        let transport: Box<dyn Transport> = match kind {
            TransportKind::Raw => Box::new(RawSocketTransport::bind_client_listener(MULTICAST_PORT, interface)?),
            TransportKind::Tokio => Box::new(TokioTransport::bind_client_listener(MULTICAST_PORT, interface)?),
        };
        info!(role = "client", client_id = config.client_id, ?kind, "client listening for broadcasts");
        Ok(Self { config, transport })
    }

    /// Runs the blocking receive loop forever. Recoverable per-datagram errors
    /// are logged and the loop continues; socket-level errors propagate.
    pub fn run(&self) -> Result<(), ClockError> {
        loop {
            self.receive_one()?;
        }
    }

    /// Handles exactly one inbound datagram: read time, validate, filter, reply.
    pub fn receive_one(&self) -> Result<(), ClockError> {
        let received = match self.transport.recv() {
            Ok(r) => r,
            Err(e) => {
                warn!(role = "client", error = %e, "recv failed");
                return Err(e);
            }
        };
        // Stamp arrival time immediately, before any decoding work.
        let t_arrival = now_micros();

        let Some(record) = SyncRecord::decode(&received.bytes) else {
            return Ok(()); // wrong length, drop silently
        };
        if !record.is_valid() {
            return Ok(()); // bad checksum, drop silently
        }
        if self.config.filter_clock_id != 0 && self.config.filter_clock_id != record.clock_id {
            return Ok(()); // filtered out, drop silently
        }

        #[cfg(feature = "diag")]
        tracing::debug!(role = "client", recvd = %record.to_hex(), "received broadcast");

        let reply = SyncRecord::new(self.config.client_id, record.server_ts, t_arrival);

        #[cfg(feature = "diag")]
        tracing::debug!(role = "client", sent = %reply.to_hex(), "sending reply");

        self.transport.send_to(&reply.encode(), received.from)?;
        Ok(())
    }

    /// Waits up to `timeout` for one datagram; returns `Ok(false)` on timeout
    /// with no datagram handled. Used by tests and by engines that need
    /// bounded receive slices rather than an unbounded blocking loop.
    pub fn receive_one_timeout(&self, timeout: Duration) -> Result<bool, ClockError> {
        let Some(received) = self.transport.recv_timeout(timeout)? else {
            return Ok(false);
        };
        let t_arrival = now_micros();

        let Some(record) = SyncRecord::decode(&received.bytes) else {
            return Ok(true);
        };
        if !record.is_valid() {
            return Ok(true);
        }
        if self.config.filter_clock_id != 0 && self.config.filter_clock_id != record.clock_id {
            return Ok(true);
        }

        let reply = SyncRecord::new(self.config.client_id, record.server_ts, t_arrival);
        self.transport.send_to(&reply.encode(), received.from)?;
        Ok(true)
    }
}
