//! HTTP client building with middleware.

mod client;
mod origin;

pub use client::{HttpClientBuilder, HttpClientConfig};
pub use origin::{with_origin_header, OriginHeader, LOOPBACK_ORIGIN};
