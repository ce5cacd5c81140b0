// SPDX-License-Identifier: BUSL-1.1
//! SFC simulator gateway: standalone development server.
//!
//! Serves the JSON-RPC gateway protocol backed by an in-memory chain. The
//! payer address is logged at startup; its secret is the `StubConfig`
//! default.
//!
//! Storage is in-memory with no persistence; data is lost on restart.

use std::net::SocketAddr;

use sfcv_stub::{SimulatedChain, StubConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port: u16 = std::env::var("SFCV_STUB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(18545);

    let chain = SimulatedChain::new(StubConfig::default());
    let payer = chain.payer();

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(payer = %payer.address, "sfcv-stub listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    sfcv_stub::serve(listener, chain).await
}
