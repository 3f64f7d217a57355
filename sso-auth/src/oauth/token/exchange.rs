//! Authorization code redemption.

use chrono::Utc;
use log::*;
use reqwest::header::ACCEPT;
use serde::Deserialize;

use super::{Token, TokenResponse};
use crate::error::{token_exchange_error, Error, TokenExchangeErrorKind};
use crate::http::with_origin_header;
use crate::oauth::discovery::OAuthConfig;
use crate::oauth::pkce::PkceVerifier;

/// Identity provider error returned when a token request carries an `Origin`
/// header but the client registration does not allow cross-origin redemption.
pub const CROSS_ORIGIN_REJECTED: &str = "AADSTS9002326";
const CROSS_ORIGIN_REJECTED_CODE: i64 = 9002326;

/// OAuth error response body.
#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_codes: Vec<i64>,
}

impl ErrorResponse {
    fn rejects_origin(&self) -> bool {
        self.error_codes.contains(&CROSS_ORIGIN_REJECTED_CODE)
            || self
                .error_description
                .as_deref()
                .is_some_and(|d| d.contains(CROSS_ORIGIN_REJECTED))
    }
}

enum AttemptError {
    /// The provider refused the request because of the Origin header.
    OriginRejected(Error),
    Fatal(Error),
}

/// Redeems an authorization code plus PKCE verifier for an access token.
///
/// The first attempt sends `Origin: http://localhost`. If the provider rejects
/// that header specifically, the request is repeated once without it. Every
/// other failure is terminal.
pub struct Exchanger {
    client: reqwest::Client,
}

impl Exchanger {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn exchange(
        &self,
        oauth: &OAuthConfig,
        code: &str,
        verifier: &PkceVerifier,
        redirect_uri: &str,
    ) -> Result<Token, Error> {
        match self.attempt(oauth, code, verifier, redirect_uri, true).await {
            Ok(token) => Ok(token),
            Err(AttemptError::OriginRejected(err)) => {
                info!("Token endpoint rejected the Origin header, retrying without it");
                debug!("Origin rejection: {}", err);
                self.attempt(oauth, code, verifier, redirect_uri, false)
                    .await
                    .map_err(|e| match e {
                        AttemptError::OriginRejected(err) | AttemptError::Fatal(err) => err,
                    })
            }
            Err(AttemptError::Fatal(err)) => Err(err),
        }
    }

    async fn attempt(
        &self,
        oauth: &OAuthConfig,
        code: &str,
        verifier: &PkceVerifier,
        redirect_uri: &str,
        with_origin: bool,
    ) -> Result<Token, AttemptError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier.as_str()),
            ("redirect_uri", redirect_uri),
            ("client_id", oauth.client_id.as_str()),
        ];

        debug!(
            "Exchanging authorization code at {} (origin header: {})",
            oauth.token_url, with_origin
        );

        let response = with_origin_header(self.client.clone(), with_origin)
            .post(oauth.token_url.clone())
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to reach token endpoint: {:?}", e);
                AttemptError::Fatal(token_exchange_error(
                    TokenExchangeErrorKind::Network,
                    &e.to_string(),
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AttemptError::Fatal(token_exchange_error(
                TokenExchangeErrorKind::Network,
                &e.to_string(),
            ))
        })?;

        if status.is_success() {
            let token_response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
                warn!("Failed to parse token response: {:?}", e);
                AttemptError::Fatal(token_exchange_error(
                    TokenExchangeErrorKind::InvalidResponse,
                    &format!("invalid token response: {}", e),
                ))
            })?;
            info!("Successfully exchanged authorization code for an access token");
            return Ok(Token::from_response(token_response, Utc::now()));
        }

        let error_response: ErrorResponse = serde_json::from_str(&body).unwrap_or_default();
        let message = match (&error_response.error, &error_response.error_description) {
            (Some(error), Some(description)) => format!("{}: {}", error, description),
            (Some(error), None) => error.clone(),
            (None, Some(description)) => description.clone(),
            (None, None) if body.trim().is_empty() => format!("token endpoint returned {}", status),
            (None, None) => format!("token endpoint returned {}: {}", status, body.trim()),
        };
        warn!("Token exchange rejected: {}", message);

        let err = token_exchange_error(TokenExchangeErrorKind::Rejected, &message);
        if with_origin && error_response.rejects_origin() {
            Err(AttemptError::OriginRejected(err))
        } else {
            Err(AttemptError::Fatal(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::http::LOOPBACK_ORIGIN;
    use mockito::{Matcher, Server, ServerGuard};
    use secrecy::ExposeSecret;
    use url::Url;

    const ORIGIN_REJECTED_BODY: &str = r#"{
        "error": "invalid_request",
        "error_description": "AADSTS9002326: Cross-origin token redemption is permitted only for the 'Single-Page Application' client-type.",
        "error_codes": [9002326]
    }"#;

    fn oauth_config(server: &ServerGuard) -> OAuthConfig {
        OAuthConfig {
            authorize_url: Url::parse(&format!("{}/authorize", server.url())).unwrap(),
            token_url: Url::parse(&format!("{}/token", server.url())).unwrap(),
            client_id: "cli-id".to_string(),
            scopes: vec!["openid".to_string()],
            ports: None,
        }
    }

    fn verifier() -> PkceVerifier {
        PkceVerifier::from_string("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string())
    }

    async fn exchange(server: &ServerGuard) -> Result<Token, Error> {
        Exchanger::new(reqwest::Client::new())
            .exchange(
                &oauth_config(server),
                "ABC123",
                &verifier(),
                "http://localhost:21000/login",
            )
            .await
    }

    #[tokio::test]
    async fn test_exchange_sends_verifier_with_origin() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_header("origin", LOOPBACK_ORIGIN)
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "ABC123".into()),
                Matcher::UrlEncoded(
                    "code_verifier".into(),
                    "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".into(),
                ),
                Matcher::UrlEncoded(
                    "redirect_uri".into(),
                    "http://localhost:21000/login".into(),
                ),
                Matcher::UrlEncoded("client_id".into(), "cli-id".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "xyz", "token_type": "Bearer", "expires_in": 3600}"#)
            .expect(1)
            .create_async()
            .await;

        let token = exchange(&server).await.unwrap();

        mock.assert_async().await;
        assert_eq!(token.access_token.expose_secret(), "xyz");
        assert!(token.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_origin_rejection_retries_once_without_origin() {
        let mut server = Server::new_async().await;
        let with_origin = server
            .mock("POST", "/token")
            .match_header("origin", LOOPBACK_ORIGIN)
            .with_status(400)
            .with_body(ORIGIN_REJECTED_BODY)
            .expect(1)
            .create_async()
            .await;
        let without_origin = server
            .mock("POST", "/token")
            .match_header("origin", Matcher::Missing)
            .with_status(200)
            .with_body(r#"{"access_token": "xyz"}"#)
            .expect(1)
            .create_async()
            .await;

        let token = exchange(&server).await.unwrap();

        with_origin.assert_async().await;
        without_origin.assert_async().await;
        assert_eq!(token.access_token.expose_secret(), "xyz");
    }

    #[tokio::test]
    async fn test_always_rejecting_endpoint_gets_two_attempts() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(ORIGIN_REJECTED_BODY)
            .expect(2)
            .create_async()
            .await;

        let err = exchange(&server).await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(
            err.error_kind,
            ErrorKind::TokenExchange(TokenExchangeErrorKind::Rejected)
        );
    }

    #[tokio::test]
    async fn test_other_rejections_are_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant", "error_description": "code expired"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = exchange(&server).await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(
            err.error_kind,
            ErrorKind::TokenExchange(TokenExchangeErrorKind::Rejected)
        );
        assert!(err.to_string().contains("invalid_grant: code expired"));
    }

    #[tokio::test]
    async fn test_plain_text_error_body() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(502)
            .with_body("upstream unavailable")
            .expect(1)
            .create_async()
            .await;

        let err = exchange(&server).await.unwrap_err();
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"token_type": "Bearer"}"#)
            .create_async()
            .await;

        let err = exchange(&server).await.unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::TokenExchange(TokenExchangeErrorKind::InvalidResponse)
        );
    }
}
