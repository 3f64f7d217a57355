//! OAuth 2.0 authorization code login with PKCE for command-line clients.
//!
//! The flow discovers the service's OAuth client, listens on a loopback port,
//! sends the user's browser to the identity provider, waits for the redirect
//! and redeems the code.

mod browser;
mod callback;
mod discovery;
mod listener;
mod pkce;
mod session;
mod state;

pub mod token;

pub use browser::{authorization_url, Browser, NoBrowser, SystemBrowser};
pub use callback::{start as start_callback_server, AuthorizationReceiver, CallbackServerHandle};
pub use discovery::{normalize_service_url, OAuthConfig, Resolver, WELL_KNOWN_PATH};
pub use listener::{bind as bind_callback_listener, callback_url, CallbackListener, PortRange};
pub use pkce::{PkceChallenge, PkceVerifier};
pub use session::{Login, LoginConfig, LoginPhase, LoginSession, DEFAULT_LOGIN_TIMEOUT};
pub use state::RequestState;
