//! `Origin` header decorator for token requests.
//!
//! Some identity providers only redeem authorization codes for public PKCE
//! clients when the request carries an `Origin` header, while others reject the
//! same header for other client registrations. The header is added by a
//! middleware toggled per client instead of being set on individual requests.

use async_trait::async_trait;
use http::Extensions;
use reqwest::header::{HeaderValue, ORIGIN};
use reqwest::{Request, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};

/// Origin presented by the loopback client.
pub const LOOPBACK_ORIGIN: &str = "http://localhost";

/// Middleware that sets `Origin: http://localhost` when enabled and guarantees
/// its absence when disabled.
#[derive(Debug, Clone, Copy)]
pub struct OriginHeader {
    enabled: bool,
}

impl OriginHeader {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Middleware for OriginHeader {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        if self.enabled {
            req.headers_mut()
                .insert(ORIGIN, HeaderValue::from_static(LOOPBACK_ORIGIN));
        } else {
            req.headers_mut().remove(ORIGIN);
        }
        next.run(req, extensions).await
    }
}

/// Wrap `client` so every request it sends has the Origin header set or removed.
pub fn with_origin_header(client: reqwest::Client, enabled: bool) -> ClientWithMiddleware {
    ClientBuilder::new(client)
        .with(OriginHeader::new(enabled))
        .build()
}
