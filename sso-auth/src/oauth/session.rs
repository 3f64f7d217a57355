//! Login orchestration.
//!
//! One [`Login::run`] call is one login transaction:
//!
//! ```text
//! Discovering -> AwaitingRedirect -> Exchanging -> Complete
//!      \               |                  |
//!       `--------------+------------------+--> Failed
//! ```
//!
//! Everything a transaction creates (state, PKCE pair, listener, callback
//! server) belongs to that call and is torn down before it returns.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::*;
use tokio_util::sync::CancellationToken;

use super::browser::{self, Browser, SystemBrowser};
use super::callback;
use super::discovery::{normalize_service_url, OAuthConfig, Resolver};
use super::listener::{self, PortRange};
use super::pkce::{PkceChallenge, PkceVerifier};
use super::state::RequestState;
use super::token::{Exchanger, Token};
use crate::error::{login_error, Error, LoginErrorKind};
use crate::http::{HttpClientBuilder, HttpClientConfig};
use crate::ui::{NoopUi, Ui};

/// Default time allowed for the user to finish in the browser.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Settings for a login transaction.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    /// How long to wait for the browser redirect.
    pub timeout: Duration,
    /// Callback ports to scan, unless the service advertises its own.
    pub ports: PortRange,
    pub http: HttpClientConfig,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOGIN_TIMEOUT,
            ports: PortRange::default(),
            http: HttpClientConfig::default(),
        }
    }
}

/// Per-login secrets and endpoints.
///
/// The challenge is derived once from the proof key at construction.
#[derive(Debug)]
pub struct LoginSession {
    request_state: RequestState,
    proof_key: PkceVerifier,
    proof_key_challenge: PkceChallenge,
    callback_url: String,
    oauth: OAuthConfig,
}

impl LoginSession {
    pub fn new(oauth: OAuthConfig, callback_url: String) -> Self {
        let proof_key = PkceVerifier::generate();
        let proof_key_challenge = proof_key.challenge();
        Self {
            request_state: RequestState::generate(),
            proof_key,
            proof_key_challenge,
            callback_url,
            oauth,
        }
    }

    pub fn request_state(&self) -> &RequestState {
        &self.request_state
    }

    pub fn proof_key(&self) -> &PkceVerifier {
        &self.proof_key
    }

    pub fn proof_key_challenge(&self) -> &PkceChallenge {
        &self.proof_key_challenge
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn oauth(&self) -> &OAuthConfig {
        &self.oauth
    }
}

/// Where a login transaction currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPhase {
    Discovering,
    AwaitingRedirect,
    Exchanging,
    Complete,
    Failed,
}

impl fmt::Display for LoginPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoginPhase::Discovering => write!(f, "discovering"),
            LoginPhase::AwaitingRedirect => write!(f, "awaiting redirect"),
            LoginPhase::Exchanging => write!(f, "exchanging"),
            LoginPhase::Complete => write!(f, "complete"),
            LoginPhase::Failed => write!(f, "failed"),
        }
    }
}

fn transition(phase: &mut LoginPhase, next: LoginPhase) {
    debug!("Login phase {} -> {}", phase, next);
    *phase = next;
}

/// Browser-mediated OAuth 2.0 authorization code login with PKCE.
pub struct Login {
    config: LoginConfig,
    resolver: Resolver,
    exchanger: Exchanger,
    browser: Arc<dyn Browser>,
    ui: Arc<dyn Ui>,
}

impl Login {
    /// Create a login using the system browser and no user output.
    pub fn new(config: LoginConfig) -> Result<Self, Error> {
        let client = HttpClientBuilder::from_config(config.http.clone()).build()?;
        Ok(Self::with_client(config, client))
    }

    /// Create a login that sends discovery and token requests through `client`.
    pub fn with_client(config: LoginConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            resolver: Resolver::new(client.clone()),
            exchanger: Exchanger::new(client),
            browser: Arc::new(SystemBrowser),
            ui: Arc::new(NoopUi),
        }
    }

    pub fn with_browser(mut self, browser: Arc<dyn Browser>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_ui(mut self, ui: Arc<dyn Ui>) -> Self {
        self.ui = ui;
        self
    }

    /// Log in to `service` and return the acquired token.
    pub async fn run(&self, service: &str) -> Result<Token, Error> {
        self.run_until_cancelled(service, CancellationToken::new())
            .await
    }

    /// Like [`Login::run`], but gives up as soon as `cancel` fires.
    pub async fn run_until_cancelled(
        &self,
        service: &str,
        cancel: CancellationToken,
    ) -> Result<Token, Error> {
        let mut phase = LoginPhase::Discovering;

        match self.drive(service, &cancel, &mut phase).await {
            Ok(token) => {
                transition(&mut phase, LoginPhase::Complete);
                Ok(token)
            }
            Err(e) => {
                debug!("Login to {} failed while {}: {}", service, phase, e);
                transition(&mut phase, LoginPhase::Failed);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        service: &str,
        cancel: &CancellationToken,
        phase: &mut LoginPhase,
    ) -> Result<Token, Error> {
        let service_url = normalize_service_url(service)?;

        let oauth = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            resolved = self.resolver.resolve(&service_url) => resolved?,
        };

        let ports = oauth.ports.unwrap_or(self.config.ports);
        let bound = listener::bind(ports).await?;
        let session = LoginSession::new(oauth, bound.callback_url);
        let (mut server, code_rx) = callback::start(bound.listener, session.request_state().clone());

        let auth_url = browser::authorization_url(
            session.oauth(),
            session.request_state(),
            session.proof_key_challenge(),
            session.callback_url(),
        );

        // The deadline covers the browser launch too.
        let timeout = self.config.timeout;
        let deadline = tokio::time::Instant::now() + timeout;

        self.ui.output(&format!(
            "Opening a web browser to log in to {}. If it does not open, visit this URL:\n\n    {}\n",
            service_url.host_str().unwrap_or(service),
            auth_url
        ));
        if let Err(e) = self.browser.open(auth_url.as_str()) {
            warn!("Failed to open a web browser: {}", e);
            self.ui.output("Unable to open a web browser automatically; open the URL above to continue.");
        }
        self.ui.output("Waiting for the login to complete...");

        transition(phase, LoginPhase::AwaitingRedirect);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled()),
            received = tokio::time::timeout_at(deadline, code_rx) => match received {
                Ok(Ok(code)) => Ok(code),
                Ok(Err(_)) => Err(login_error(
                    LoginErrorKind::CallbackClosed,
                    "callback server stopped without receiving an authorization code",
                )),
                Err(_) => Err(login_error(
                    LoginErrorKind::Timeout,
                    &format!("no authorization redirect received within {:?}", timeout),
                )),
            },
        };

        server.shutdown().await;
        let code = outcome?;

        transition(phase, LoginPhase::Exchanging);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled()),
            exchanged = self.exchanger.exchange(
                session.oauth(),
                &code,
                session.proof_key(),
                session.callback_url(),
            ) => exchanged,
        }
    }
}

fn cancelled() -> Error {
    login_error(LoginErrorKind::Cancelled, "login cancelled")
}
