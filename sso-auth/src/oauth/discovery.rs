//! Service discovery for login endpoints.
//!
//! A service advertises its OAuth client in a well-known JSON document:
//!
//! ```json
//! { "login.v1": { "authz": "...", "token": "...", "client": "...",
//!                 "grant_types": ["authz_code"], "scopes": ["openid"],
//!                 "ports": [21000, 21199] } }
//! ```

use log::*;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::listener::PortRange;
use crate::error::{discovery_error, DiscoveryErrorKind, Error};

/// Path of the discovery document, relative to the service host.
pub const WELL_KNOWN_PATH: &str = "/.well-known/terraform.json";

const LOGIN_SERVICE_KEY: &str = "login.v1";
const AUTHZ_CODE_GRANT: &str = "authz_code";

/// OAuth client configuration advertised by a service.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthConfig {
    pub authorize_url: Url,
    pub token_url: Url,
    pub client_id: String,
    pub scopes: Vec<String>,
    /// Callback ports the client registration accepts, if the service restricts them.
    pub ports: Option<PortRange>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    #[serde(rename = "login.v1")]
    login: Option<LoginDocument>,
}

#[derive(Debug, Deserialize)]
struct LoginDocument {
    authz: String,
    client: String,
    token: String,
    #[serde(default)]
    grant_types: Option<Vec<String>>,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    ports: Option<Vec<u16>>,
}

/// Turn user input into an absolute service URL.
///
/// A bare hostname (`app.example.io`) is assumed to be served over HTTPS.
pub fn normalize_service_url(service: &str) -> Result<Url, Error> {
    let service = service.trim();
    let candidate = if service.contains("://") {
        service.to_string()
    } else {
        format!("https://{}", service)
    };

    let url = Url::parse(&candidate).map_err(|e| {
        discovery_error(
            DiscoveryErrorKind::InvalidServiceUrl,
            &format!("{:?} is not a valid service URL: {}", service, e),
        )
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(discovery_error(
            DiscoveryErrorKind::InvalidServiceUrl,
            &format!("{:?} is not an http(s) service URL", service),
        ));
    }

    Ok(url)
}

/// Fetches and parses the discovery document. Single-shot, no retries.
pub struct Resolver {
    client: reqwest::Client,
}

impl Resolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Resolve the OAuth configuration for `service`.
    pub async fn resolve(&self, service: &Url) -> Result<OAuthConfig, Error> {
        let discovery_url = service.join(WELL_KNOWN_PATH).map_err(|e| {
            discovery_error(DiscoveryErrorKind::InvalidServiceUrl, &e.to_string())
        })?;

        debug!("Fetching discovery document from {}", discovery_url);

        let response = self
            .client
            .get(discovery_url.clone())
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to fetch discovery document: {:?}", e);
                discovery_error(DiscoveryErrorKind::Network, &e.to_string())
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(discovery_error(
                DiscoveryErrorKind::UnexpectedStatus,
                &format!("{} returned {}", discovery_url, status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| discovery_error(DiscoveryErrorKind::Network, &e.to_string()))?;

        parse_document(&discovery_url, &body)
    }
}

/// Parse a discovery document body fetched from `discovery_url`.
///
/// Relative endpoint URLs are resolved against `discovery_url`.
pub fn parse_document(discovery_url: &Url, body: &str) -> Result<OAuthConfig, Error> {
    let document: DiscoveryDocument = serde_json::from_str(body).map_err(|e| {
        discovery_error(
            DiscoveryErrorKind::InvalidDocument,
            &format!("malformed discovery document: {}", e),
        )
    })?;

    let login = document.login.ok_or_else(|| {
        discovery_error(
            DiscoveryErrorKind::LoginNotSupported,
            &format!("service does not advertise {}", LOGIN_SERVICE_KEY),
        )
    })?;

    if let Some(grant_types) = &login.grant_types {
        if !grant_types.iter().any(|g| g == AUTHZ_CODE_GRANT) {
            return Err(discovery_error(
                DiscoveryErrorKind::UnsupportedGrant,
                &format!("supported grant types are {:?}", grant_types),
            ));
        }
    }

    let resolve = |field: &str, value: &str| {
        discovery_url.join(value).map_err(|e| {
            discovery_error(
                DiscoveryErrorKind::InvalidDocument,
                &format!("invalid {} URL {:?}: {}", field, value, e),
            )
        })
    };

    let ports = match login.ports.as_deref() {
        None => None,
        Some([min, max]) if min <= max => Some(PortRange::new(*min, *max)),
        Some(other) => {
            return Err(discovery_error(
                DiscoveryErrorKind::InvalidDocument,
                &format!("invalid ports {:?}, expected [min, max]", other),
            ))
        }
    };

    Ok(OAuthConfig {
        authorize_url: resolve("authz", &login.authz)?,
        token_url: resolve("token", &login.token)?,
        client_id: login.client,
        scopes: login.scopes,
        ports,
    })
}
