//! # sso-auth
//!
//! Browser-mediated single sign-on for command-line tools:
//! - Service discovery of the OAuth client (`/.well-known/terraform.json`)
//! - OAuth 2.0 authorization code flow with PKCE and CSRF state
//! - A loopback callback server that lives for exactly one login
//! - Token exchange, including the `Origin` header fallback some identity
//!   providers require
//! - A file-backed credentials store for the acquired token
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sso_auth::credentials::{credential_key, FileStorage, Storage};
//! use sso_auth::oauth::{normalize_service_url, Login, LoginConfig};
//!
//! let login = Login::new(LoginConfig::default())?;
//! let token = login.run("app.example.io").await?;
//! let key = credential_key(&normalize_service_url("app.example.io")?);
//! FileStorage::new("credentials.json").store(&key, &token).await?;
//! ```

pub mod credentials;
pub mod error;
pub mod http;
pub mod oauth;
pub mod ui;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
