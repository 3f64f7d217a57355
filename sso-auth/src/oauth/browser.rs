//! Authorization URL construction and browser launching.

use log::*;
use url::Url;

use super::discovery::OAuthConfig;
use super::pkce::{PkceChallenge, CHALLENGE_METHOD};
use super::state::RequestState;
use crate::error::{browser_error, Error};

/// Opens URLs for the user.
pub trait Browser: Send + Sync {
    fn open(&self, url: &str) -> Result<(), Error>;
}

/// Launches the operating system's default browser.
///
/// The launcher runs detached, so a terminal browser started by it cannot
/// hold up the login.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Browser for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), Error> {
        open::that_detached(url).map_err(|e| browser_error(&e.to_string()))
    }
}

/// Never opens anything; the user follows the printed URL instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

impl Browser for NoBrowser {
    fn open(&self, _url: &str) -> Result<(), Error> {
        debug!("Browser launching disabled");
        Ok(())
    }
}

/// Build the authorization request URL the user is sent to.
pub fn authorization_url(
    oauth: &OAuthConfig,
    state: &RequestState,
    challenge: &PkceChallenge,
    redirect_uri: &str,
) -> Url {
    let mut url = oauth.authorize_url.clone();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", &oauth.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state.as_str())
            .append_pair("code_challenge", challenge.as_str())
            .append_pair("code_challenge_method", CHALLENGE_METHOD);
        if !oauth.scopes.is_empty() {
            query.append_pair("scope", &oauth.scopes.join(" "));
        }
    }
    url
}
