//! Credential storage trait for login tokens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use url::Url;

use crate::error::Error;
use crate::oauth::token::Token;

/// A token as read back from storage.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub token: SecretString,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Key a service's credentials are stored under: its host, plus the port when
/// it is not the scheme default.
pub fn credential_key(service: &Url) -> String {
    let host = service.host_str().unwrap_or_default().to_lowercase();
    match service.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}

/// Trait for persisting login tokens.
///
/// Implementations should:
/// - Keep token files readable by the owning user only
/// - Handle concurrent access safely
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store the token for a service, replacing any previous one.
    async fn store(&self, service_key: &str, token: &Token) -> Result<(), Error>;

    /// Retrieve the token for a service.
    async fn get(&self, service_key: &str) -> Result<Option<StoredCredential>, Error>;

    /// Forget the token for a service.
    ///
    /// Returns `true` if a token was removed.
    async fn delete(&self, service_key: &str) -> Result<bool, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_key() {
        let url = Url::parse("https://App.Example.io/some/path").unwrap();
        assert_eq!(credential_key(&url), "app.example.io");

        let url = Url::parse("https://app.example.io:443/").unwrap();
        assert_eq!(credential_key(&url), "app.example.io");

        let url = Url::parse("http://localhost:8080/").unwrap();
        assert_eq!(credential_key(&url), "localhost:8080");
    }
}
