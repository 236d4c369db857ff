//! Line reversal server binary.
//!
//! Serves the line reversal application over the strand reliable
//! transport: every completed inbound line comes back reversed.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strand_transport::{Server, ServerConfig, DEFAULT_PORT};

mod reverse;

use crate::reverse::Reverser;

#[derive(Debug, Parser)]
#[command(name = "strand-server", about = "Line reversal over reliable UDP")]
struct Args {
    /// UDP port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strand_server=info,strand_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = ServerConfig {
        bind: SocketAddr::from(([0, 0, 0, 0], args.port)),
        ..ServerConfig::default()
    };

    let server = Server::bind(config, Arc::new(Reverser)).await?;
    server.run().await?;

    Ok(())
}
