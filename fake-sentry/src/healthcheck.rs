use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::Config;

const HEALTHCHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Checks that a fake upstream is serving on the configured address.
pub async fn healthcheck(config: Config) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(HEALTHCHECK_TIMEOUT)
        .build()?;
    let url = format!("http://{}/health", connect_addr(config.http_addr));

    tracing::debug!("sending healthcheck request to {}", url);
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("fake-sentry is not reachable at {url}"))?;
    if !response.status().is_success() {
        anyhow::bail!("Bad Status: {}", response.status());
    }

    tracing::info!("OK");
    Ok(())
}

/// Maps wildcard bind addresses to the loopback address of the same family.
fn connect_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => (Ipv4Addr::LOCALHOST, addr.port()).into(),
        IpAddr::V6(ip) if ip.is_unspecified() => (Ipv6Addr::LOCALHOST, addr.port()).into(),
        _ => addr,
    }
}
