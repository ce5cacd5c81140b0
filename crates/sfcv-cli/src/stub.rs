//! # Stub Subcommand
//!
//! `sfcv stub` serves a fresh in-memory chain over the JSON-RPC gateway
//! protocol until interrupted. The payer credentials are printed on stdout
//! so they can be exported as `SFCV_PAYER_ADDRESS` and `SFCV_PAYER_KEY`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use clap::Args;

use sfcv_stub::{SimulatedChain, StubConfig};

/// Arguments for `sfcv stub`.
#[derive(Args, Debug)]
pub struct StubArgs {
    /// Interface to bind.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, default_value_t = 18545)]
    pub port: u16,
}

pub async fn run_stub(args: &StubArgs) -> Result<u8> {
    let config = StubConfig::default();
    let chain = SimulatedChain::new(config.clone());
    let payer = chain.payer();

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let bound = listener.local_addr().context("failed to read bound address")?;

    let banner = serde_json::json!({
        "endpoint": format!("http://{bound}"),
        "contract": config.proxy_address,
        "payerAddress": payer.address,
        "payerKey": config.payer_secret,
    });
    println!("{banner}");
    tracing::info!(%bound, payer = %payer.address, "simulator listening");

    sfcv_stub::serve(listener, chain)
        .await
        .context("simulator server failed")?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn port_in_use_is_reported() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let args = StubArgs {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: taken.local_addr().unwrap().port(),
        };
        let err = run_stub(&args).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to bind"));
    }
}
