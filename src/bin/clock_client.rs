//! `clock_client` — multicast listening client for clock synchronization.

use anyhow::Result;
use clap::Parser;
use clock_core::client::{ClientConfig, ClientEngine};
use clock_core::transport::TransportKind;
use tracing_subscriber::EnvFilter;

/// Joins the clock-sync multicast group, stamps each broadcast's arrival
/// time, and replies by unicast so the server can estimate this client's
/// clock offset.
#[derive(Parser)]
#[clap(name = "clock_client", version, about)]
struct Cli {
    /// This client's id, carried in every reply it sends.
    client_id: u32,

    /// If nonzero, only respond to broadcasts carrying this clock id.
    #[clap(default_value_t = 0)]
    clock_id: u32,

    /// Transport implementation to use.
    #[clap(long, value_enum, default_value_t = TransportArg::Raw)]
    transport: TransportArg,
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

    let config = ClientConfig { client_id: cli.client_id, filter_clock_id: cli.clock_id };
    let client = ClientEngine::start(config, cli.transport.into(), None)?;

    tracing::info!(
        role = "client",
        client_id = cli.client_id,
        filter_clock_id = cli.clock_id,
        "clock_client listening — Ctrl-C to stop"
    );

    client.run()?;
    Ok(())
}
