//! Error types for the `sso-auth` crate.
//!
//! Follows the same pattern as the service layer: a root Error struct holding an
//! error kind tree and an optional source for chaining. Each top-level kind names
//! the login phase that failed so callers can render a single line.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for sso-auth crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in sso-auth.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Discovery(DiscoveryErrorKind),
    /// Every port in the configured callback range is already taken.
    NoPortAvailable,
    Login(LoginErrorKind),
    TokenExchange(TokenExchangeErrorKind),
    Browser,
    Credential(CredentialErrorKind),
    Http(HttpErrorKind),
}

/// Errors from resolving the service's login discovery document.
#[derive(Debug, PartialEq)]
pub enum DiscoveryErrorKind {
    InvalidServiceUrl,
    Network,
    UnexpectedStatus,
    InvalidDocument,
    LoginNotSupported,
    UnsupportedGrant,
}

/// Errors while waiting for the browser redirect.
#[derive(Debug, PartialEq)]
pub enum LoginErrorKind {
    Timeout,
    Cancelled,
    /// The result channel closed without ever yielding a code.
    CallbackClosed,
    /// Reserved: forged redirects are currently ignored rather than fatal.
    StateMismatch,
}

/// Errors from redeeming the authorization code.
#[derive(Debug, PartialEq)]
pub enum TokenExchangeErrorKind {
    Rejected,
    Network,
    InvalidResponse,
}

/// Errors from the credentials store.
#[derive(Debug, PartialEq)]
pub enum CredentialErrorKind {
    Read,
    Write,
    InvalidFormat,
}

/// Errors from HTTP client operations.
#[derive(Debug, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    RequestFailed,
    Network,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Discovery(kind) => write!(f, "Service discovery failed: {:?}", kind)?,
            ErrorKind::NoPortAvailable => write!(f, "No callback port available")?,
            ErrorKind::Login(kind) => write!(f, "Login failed: {:?}", kind)?,
            ErrorKind::TokenExchange(kind) => write!(f, "Token exchange failed: {:?}", kind)?,
            ErrorKind::Browser => write!(f, "Browser launch failed")?,
            ErrorKind::Credential(kind) => write!(f, "Credential store error: {:?}", kind)?,
            ErrorKind::Http(kind) => write!(f, "HTTP error: {:?}", kind)?,
        }
        match &self.source {
            Some(source) => write!(f, " ({})", source),
            None => Ok(()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Http(HttpErrorKind::BuilderFailed)
        } else if err.is_request() {
            ErrorKind::Http(HttpErrorKind::RequestFailed)
        } else {
            ErrorKind::Http(HttpErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

/// Helper function to create discovery errors.
pub fn discovery_error(kind: DiscoveryErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Discovery(kind),
    }
}

/// Helper function to create the port exhaustion error.
pub fn no_port_available(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::NoPortAvailable,
    }
}

/// Helper function to create login errors.
pub fn login_error(kind: LoginErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Login(kind),
    }
}

/// Helper function to create token exchange errors.
pub fn token_exchange_error(kind: TokenExchangeErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::TokenExchange(kind),
    }
}

/// Helper function to create browser launch errors.
pub fn browser_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Browser,
    }
}

/// Helper function to create credential store errors.
pub fn credential_error(kind: CredentialErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Credential(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_phase_and_cause() {
        let err = login_error(LoginErrorKind::Timeout, "no redirect within 300s");
        assert_eq!(
            err.to_string(),
            "Login failed: Timeout (no redirect within 300s)"
        );
    }

    #[test]
    fn test_display_without_source() {
        let err = Error {
            source: None,
            error_kind: ErrorKind::NoPortAvailable,
        };
        assert_eq!(err.to_string(), "No callback port available");
    }

    #[test]
    fn test_helpers_set_kind() {
        assert_eq!(
            discovery_error(DiscoveryErrorKind::UnexpectedStatus, "404").error_kind,
            ErrorKind::Discovery(DiscoveryErrorKind::UnexpectedStatus)
        );
        assert_eq!(
            token_exchange_error(TokenExchangeErrorKind::Rejected, "invalid_grant").error_kind,
            ErrorKind::TokenExchange(TokenExchangeErrorKind::Rejected)
        );
        assert_eq!(no_port_available("range").error_kind, ErrorKind::NoPortAvailable);
    }
}
