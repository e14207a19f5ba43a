//! Hostname resolution for `NewClient` destinations.
//!
//! A thin wrapper over `tokio::net::lookup_host`: resolve, take the first
//! usable address, surface a typed error rather than panicking on NXDOMAIN.

use crate::error::{TunnelError, TunnelResult};
use std::net::SocketAddr;

/// Resolve `host:port` to the first address the OS returns (IPv4 or IPv6,
/// whichever `lookup_host` yields first).
pub async fn resolve_first(host: &str, port: u16) -> TunnelResult<SocketAddr> {
    let lookup_addr = format!("{host}:{port}");
    let mut addrs = tokio::net::lookup_host(&lookup_addr)
        .await
        .map_err(|source| TunnelError::Resolve {
            host: host.to_string(),
            source,
        })?;

    addrs.next().ok_or_else(|| TunnelError::NoResolvedAddress {
        host: host.to_string(),
    })
}
