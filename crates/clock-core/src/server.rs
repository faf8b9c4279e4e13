//! Server engine (C5): drives the broadcast and statistics timers, receives
//! replies, computes offsets, and feeds the aggregator.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::ClockError;
use crate::stats::{StatsAggregator, DEFAULT_STATS_PATH};
use crate::timer::PeriodicTimer;
use crate::transport::{Transport, TransportKind, MULTICAST_ADDR, MULTICAST_PORT};
use crate::transport_raw::RawSocketTransport;
use crate::transport_tokio::TokioTransport;
use crate::wire::{now_micros, SyncRecord};

const STATS_FLUSH_INTERVAL_MS: u64 = 60_000;
/// Short non-blocking receive window the raw-socket broadcast worker uses to
/// drain replies before returning to the timer loop (§5).
const RAW_REPLY_WINDOW: Duration = Duration::from_millis(50);

/// `(clock_id, interval_seconds)`.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub clock_id: u32,
    pub interval_seconds: u32,
}

/// Shared engine state referenced by both timer callbacks.
struct Shared {
    config: ServerConfig,
    kind: TransportKind,
    /// Reserved for a future outbound-interface override; the raw transport
    /// currently always selects the multicast address itself as the interface,
    /// matching the reference implementation (§9).
    #[allow(dead_code)]
    interface: Option<Ipv4Addr>,
    stats: Arc<StatsAggregator>,
    /// Serializes entry into reply processing, even across multiple reception
    /// workers. Lives on the engine (not inside a per-call handler) so it
    /// actually provides cross-call mutual exclusion (§9).
    reception_lock: Mutex<()>,
    broadcast_count: AtomicU64,
    /// Tokio transport is long-lived and shared between the broadcast timer
    /// and the background reception loop; the raw transport instead opens a
    /// fresh socket per round (§9) and has no persistent entry here.
    persistent_transport: Option<Box<dyn Transport>>,
}

pub struct ServerEngine {
    shared: Arc<Shared>,
    broadcast_timer: PeriodicTimer,
    stats_timer: PeriodicTimer,
    recv_thread: Option<std::thread::JoinHandle<()>>,
    recv_running: Arc<std::sync::atomic::AtomicBool>,
}

impl ServerEngine {
    /// Builds an engine bound but not yet running. Call [`ServerEngine::start`]
    /// to begin broadcasting.
    pub fn new(
        config: ServerConfig,
        kind: TransportKind,
        interface: Option<Ipv4Addr>,
        stats_path: Option<&str>,
    ) -> Result<Self, ClockError> {
        let stats = Arc::new(StatsAggregator::new(stats_path.unwrap_or(DEFAULT_STATS_PATH)));

        let persistent_transport: Option<Box<dyn Transport>> = match kind {
            TransportKind::Raw => None,
            TransportKind::Tokio => Some(Box::new(TokioTransport::bind_server(MULTICAST_PORT)?)),
        };

        let shared = Arc::new(Shared {
            config,
            kind,
            interface,
            stats,
            reception_lock: Mutex::new(()),
            broadcast_count: AtomicU64::new(0),
            persistent_transport,
        });

        Ok(Self {
            shared,
            broadcast_timer: PeriodicTimer::new("clock-server-broadcast"),
            stats_timer: PeriodicTimer::new("clock-server-stats"),
            recv_thread: None,
            recv_running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        })
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.shared.stats
    }

    pub fn broadcast_count(&self) -> u64 {
        self.shared.broadcast_count.load(Ordering::Relaxed)
    }

    /// Starts the statistics timer (60s), the broadcast timer
    /// (`interval_seconds`), and — for the Tokio transport — a background
    /// reception loop independent of broadcast cadence.
    pub fn start(&mut self) {
        let stats_shared = self.shared.clone();
        self.stats_timer.start(STATS_FLUSH_INTERVAL_MS, move || {
            info!(role = "server", "persisting statistics for this window");
            if let Err(e) = stats_shared.stats.record_statistics() {
                error!(role = "server", error = %e, "statistics flush failed, samples retained");
            }
        });

        let broadcast_shared = self.shared.clone();
        let interval_ms = (self.shared.config.interval_seconds as u64) * 1000;
        self.broadcast_timer.start(interval_ms, move || {
            broadcast_round(&broadcast_shared);
        });

        if self.shared.kind == TransportKind::Tokio {
            self.recv_running.store(true, Ordering::Release);
            let shared = self.shared.clone();
            let running = self.recv_running.clone();
            self.recv_thread = Some(std::thread::spawn(move || {
                while running.load(Ordering::Acquire) {
                    let transport = shared
                        .persistent_transport
                        .as_deref()
                        .expect("tokio transport must be present in Tokio mode");
                    match transport.recv_timeout(RAW_REPLY_WINDOW) {
                        Ok(Some(received)) => handle_reply(&shared, &received.bytes),
                        Ok(None) => {}
                        Err(e) => warn!(role = "server", error = %e, "recv failed"),
                    }
                }
            }));
        }
    }

    /// Stops both timers (joining their workers) and the background
    /// reception loop if one was started.
    pub fn stop(&mut self) {
        self.broadcast_timer.stop();
        self.stats_timer.stop();
        self.recv_running.store(false, Ordering::Release);
        if let Some(handle) = self.recv_thread.take() {
            let _ = handle.join();
        }
    }

    /// Runs exactly one broadcast round synchronously (useful for tests and
    /// for callers that want to drive rounds without the timer).
    pub fn broadcast_round(&self) {
        broadcast_round(&self.shared);
    }
}

impl Drop for ServerEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn multicast_dest() -> SocketAddr {
    let addr: Ipv4Addr = MULTICAST_ADDR.parse().expect("multicast address constant is valid");
    SocketAddr::V4(SocketAddrV4::new(addr, MULTICAST_PORT))
}

fn broadcast_round(shared: &Arc<Shared>) {
    let record = SyncRecord::new(shared.config.clock_id, now_micros(), 0);

    #[cfg(feature = "diag")]
    tracing::debug!(role = "server", built = %record.to_hex(), "built broadcast");

    match shared.kind {
        TransportKind::Raw => {
            let transport = match RawSocketTransport::new_server_round() {
                Ok(t) => t,
                Err(e) => {
                    error!(role = "server", error = %e, "failed to open broadcast socket");
                    return;
                }
            };
            if let Err(e) = transport.send_to(&record.encode(), multicast_dest()) {
                error!(role = "server", error = %e, "broadcast send failed");
                return;
            }
            let count = shared.broadcast_count.fetch_add(1, Ordering::Relaxed) + 1;
            info!(role = "server", clock_id = shared.config.clock_id, count, "broadcast sent");

            // Drain replies for the remainder of this round's slice.
            loop {
                match transport.recv_timeout(RAW_REPLY_WINDOW) {
                    Ok(Some(received)) => handle_reply(shared, &received.bytes),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(role = "server", error = %e, "recv failed");
                        break;
                    }
                }
            }
        }
        TransportKind::Tokio => {
            let transport = shared
                .persistent_transport
                .as_deref()
                .expect("tokio transport must be present in Tokio mode");
            if let Err(e) = transport.send_to(&record.encode(), multicast_dest()) {
                error!(role = "server", error = %e, "broadcast send failed");
                return;
            }
            let count = shared.broadcast_count.fetch_add(1, Ordering::Relaxed) + 1;
            info!(role = "server", clock_id = shared.config.clock_id, count, "broadcast sent");
            // Reception for this transport runs continuously on the background thread.
        }
    }

}

/// Validates and processes one reply datagram, serialized via `reception_lock`.
fn handle_reply(shared: &Arc<Shared>, bytes: &[u8]) {
    let t_final = now_micros();

    let Some(record) = SyncRecord::decode(bytes) else {
        return;
    };
    if !record.is_valid() {
        return;
    }

    let _guard = shared.reception_lock.lock().expect("reception mutex poisoned");

    #[cfg(feature = "diag")]
    tracing::debug!(role = "server", recvd = %record.to_hex(), "received reply");

    let offset_us = (t_final as i64 + record.server_ts as i64) / 2 - record.client_ts as i64;
    shared.stats.add_point(record.clock_id, offset_us);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_formula_matches_spec() {
        let t_final: i64 = 1_700_000_010_000_000;
        let server_ts: i64 = 1_700_000_000_000_000;
        let client_ts: i64 = 1_700_000_004_000_000;
        let expected = (t_final + server_ts) / 2 - client_ts;
        assert_eq!(expected, 1_700_000_001_000_000);
    }

    #[test]
    fn handle_reply_feeds_aggregator_with_correct_sign() {
        let path = std::env::temp_dir().join(format!("clock_sync_test_server_{}.out", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let shared = Arc::new(Shared {
            config: ServerConfig { clock_id: 1, interval_seconds: 1 },
            kind: TransportKind::Raw,
            interface: None,
            stats: Arc::new(StatsAggregator::new(&path)),
            reception_lock: Mutex::new(()),
            broadcast_count: AtomicU64::new(0),
            persistent_transport: None,
        });

        // server_ts and t_final average to client_ts - 1_000_000 => offset -1_000_000.
        let t_final = now_micros();
        let server_ts = t_final; // average == t_final
        let client_ts = t_final + 1_000_000;
        let record = SyncRecord::new(7, server_ts, client_ts);
        handle_reply(&shared, &record.encode());

        shared.stats.record_statistics().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let fields: Vec<&str> = content.lines().next().unwrap().split(',').collect();
        assert_eq!(fields[1], "7");
        assert_eq!(fields[3], "-1000000"); // min == mean == median == max

        let _ = std::fs::remove_file(&path);
    }
}
