//! OAuth token types.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde::Deserialize;

/// Access token acquired by a login, with provider metadata.
#[derive(Debug, Clone)]
pub struct Token {
    /// Opaque bearer token for API requests.
    pub access_token: SecretString,
    /// Token type (usually "Bearer").
    pub token_type: String,
    /// When the access token expires, if the provider said.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    pub scopes: Vec<String>,
}

/// Successful token endpoint response body.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: SecretString,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl Token {
    /// Build a token from a response received at `received_at`.
    pub fn from_response(response: TokenResponse, received_at: DateTime<Utc>) -> Self {
        let expires_at = response
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| received_at + Duration::seconds(secs));

        let scopes = response
            .scope
            .map(|scope| scope.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            access_token: response.access_token,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at,
            scopes,
        }
    }
}
