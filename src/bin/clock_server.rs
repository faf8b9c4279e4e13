//! `clock_server` — multicast broadcasting server for clock synchronization.

use anyhow::Result;
use clap::Parser;
use clock_core::server::{ServerConfig, ServerEngine};
use clock_core::transport::TransportKind;
use tracing_subscriber::EnvFilter;

/// Broadcasts timestamped sync datagrams to the multicast group and records
/// each replying client's estimated clock offset.
#[derive(Parser)]
#[clap(name = "clock_server", version, about)]
struct Cli {
    /// This server's clock id, carried in every broadcast it emits.
    clock_id: u32,

    /// Seconds between broadcast rounds.
    #[clap(default_value_t = 10)]
    interval_seconds: u32,

    /// Transport implementation to use.
    #[clap(long, value_enum, default_value_t = TransportArg::Raw)]
    transport: TransportArg,

    /// Override the statistics output path (default: ./clock_server.out).
    #[clap(long)]
    stats_path: Option<String>,
}

/// clap-friendly mirror of [`TransportKind`]; kept separate so the protocol
/// crate doesn't need to depend on `clap`.
#[derive(Clone, Copy, clap::ValueEnum)]
enum TransportArg {
    Raw,
    Tokio,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Raw => TransportKind::Raw,
            TransportArg::Tokio => TransportKind::Tokio,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = ServerConfig { clock_id: cli.clock_id, interval_seconds: cli.interval_seconds };
    let mut server = ServerEngine::new(config, cli.transport.into(), None, cli.stats_path.as_deref())?;
    server.start();

    tracing::info!(
        role = "server",
        clock_id = cli.clock_id,
        interval_seconds = cli.interval_seconds,
        "clock_server running — Ctrl-C to stop"
    );

    // Rest the main thread; the timers and reception loop do all the work.
    // A signal-driven shutdown would stop() the engine here instead of parking.
    loop {
        std::thread::park();
    }
}
