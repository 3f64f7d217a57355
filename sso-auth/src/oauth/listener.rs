//! Loopback listener allocation for the OAuth redirect.
//!
//! Identity providers commonly allow-list installed-app redirect URIs by host
//! and path but accept any loopback port, and only when the host is literally
//! `localhost`. The callback URL is therefore always built with `localhost`
//! even though the socket is bound to the IPv4 loopback address.

use std::net::{Ipv4Addr, SocketAddr};

use log::*;
use tokio::net::TcpListener;

use crate::error::{no_port_available, Error};

/// Path the identity provider redirects the browser to.
pub const CALLBACK_PATH: &str = "/login";

pub const DEFAULT_PORT_MIN: u16 = 21000;
pub const DEFAULT_PORT_MAX: u16 = 21199;

/// Inclusive range of ports scanned for a free callback listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    min: u16,
    max: u16,
}

impl PortRange {
    /// Create a range; bounds given in either order are normalized.
    pub fn new(min: u16, max: u16) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_MIN, DEFAULT_PORT_MAX)
    }
}

/// A bound loopback listener and the redirect URI that reaches it.
#[derive(Debug)]
pub struct CallbackListener {
    pub listener: TcpListener,
    pub port: u16,
    pub callback_url: String,
}

/// Bind the first free port in `range`, scanning from low to high.
pub async fn bind(range: PortRange) -> Result<CallbackListener, Error> {
    for port in range.min()..=range.max() {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                debug!("Bound OAuth callback listener on {}", addr);
                return Ok(CallbackListener {
                    listener,
                    port,
                    callback_url: callback_url(port),
                });
            }
            Err(e) => trace!("Port {} unavailable: {}", port, e),
        }
    }

    Err(no_port_available(&format!(
        "all ports {}-{} are in use",
        range.min(),
        range.max()
    )))
}

/// Redirect URI for a listener on `port`.
pub fn callback_url(port: u16) -> String {
    format!("http://localhost:{}{}", port, CALLBACK_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_port_range_normalizes_bounds() {
        let range = PortRange::new(21010, 21000);
        assert_eq!(range.min(), 21000);
        assert_eq!(range.max(), 21010);
        assert_eq!(PortRange::default(), PortRange::new(21000, 21199));
    }

    #[test]
    fn test_callback_url_uses_localhost() {
        assert_eq!(callback_url(21005), "http://localhost:21005/login");
    }

    #[tokio::test]
    async fn test_bind_returns_listener_in_range() {
        let port = free_port();
        let bound = bind(PortRange::new(port, port)).await.unwrap();

        assert_eq!(bound.port, port);
        assert_eq!(bound.listener.local_addr().unwrap().port(), port);
        assert_eq!(bound.callback_url, format!("http://localhost:{}/login", port));
    }

    #[tokio::test]
    async fn test_bind_skips_taken_ports() {
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = held.local_addr().unwrap().port();
        if taken == u16::MAX {
            return;
        }

        match bind(PortRange::new(taken, taken + 1)).await {
            Ok(bound) => assert_eq!(bound.port, taken + 1),
            // The neighbouring port may belong to another process.
            Err(err) => assert_eq!(err.error_kind, ErrorKind::NoPortAvailable),
        }
    }

    #[tokio::test]
    async fn test_bind_exhausted_range() {
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = held.local_addr().unwrap().port();

        let err = bind(PortRange::new(port, port)).await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::NoPortAvailable);
    }
}
