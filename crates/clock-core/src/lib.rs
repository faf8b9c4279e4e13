pub mod client;
pub mod error;
pub mod server;
pub mod stats;
pub mod timer;
pub mod transport;
pub mod transport_raw;
pub mod transport_tokio;
pub mod wire;

pub use client::{ClientConfig, ClientEngine};
pub use error::ClockError;
pub use server::{ServerConfig, ServerEngine};
pub use stats::StatsAggregator;
pub use timer::PeriodicTimer;
pub use transport::{Transport, TransportKind, MULTICAST_ADDR, MULTICAST_PORT, MULTICAST_TTL};
pub use wire::{now_micros, SyncRecord, RECORD_SIZE};
