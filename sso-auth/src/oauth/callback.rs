//! Loopback HTTP server that receives the OAuth redirect.
//!
//! The server answers every path and method with the same handler and hands the
//! first valid authorization code to the waiting login through a oneshot
//! channel. It never stops itself; the owner of the [`CallbackServerHandle`]
//! shuts it down.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::RawFormRejection;
use axum::extract::{Query, RawForm, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Router;
use log::*;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::state::RequestState;

/// How long shutdown waits for in-flight connections before aborting the task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const LOGIN_SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Login successful</title></head>
<body>
<h1>Login successful</h1>
<p>The command-line login has received its authorization code. You can close this window and return to your terminal.</p>
</body>
</html>
"#;

/// Parameters an identity provider may send with the redirect, either in the
/// query string or as a form-encoded POST body (`response_mode=form_post`).
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Overlay values from a form-encoded body. Body values win over the query.
    fn merge_form(&mut self, body: &[u8]) {
        for (key, value) in url::form_urlencoded::parse(body) {
            let field = match key.as_ref() {
                "code" => &mut self.code,
                "state" => &mut self.state,
                "error" => &mut self.error,
                "error_description" => &mut self.error_description,
                _ => continue,
            };
            *field = Some(value.into_owned());
        }
    }
}

struct CallbackState {
    expected_state: RequestState,
    // Taken on first successful delivery, so later callbacks cannot send again.
    sender: Mutex<Option<oneshot::Sender<String>>>,
}

/// Receiving side of the single authorization result.
///
/// Yields the code, or `Err(RecvError)` when the server went away without one.
pub type AuthorizationReceiver = oneshot::Receiver<String>;

/// Owns the running callback server.
///
/// `shutdown` is idempotent. Dropping the handle without calling it still
/// signals the server and aborts its task.
pub struct CallbackServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Start serving `listener` in a background task.
pub fn start(
    listener: TcpListener,
    expected_state: RequestState,
) -> (CallbackServerHandle, AuthorizationReceiver) {
    let (code_tx, code_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app = router(expected_state, code_tx);

    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                // A dropped sender counts as a shutdown request too.
                let _ = shutdown_rx.await;
            })
            .await;

        match result {
            Ok(()) => debug!("OAuth callback server stopped"),
            Err(e) => error!("OAuth callback server failed: {e}"),
        }
    });

    (
        CallbackServerHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        },
        code_rx,
    )
}

fn router(expected_state: RequestState, sender: oneshot::Sender<String>) -> Router {
    let state = Arc::new(CallbackState {
        expected_state,
        sender: Mutex::new(Some(sender)),
    });

    Router::new().fallback(handle_callback).with_state(state)
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(mut params): Query<CallbackParams>,
    form: Result<RawForm, RawFormRejection>,
) -> Response {
    // GET and HEAD yield the query string again, which merges to the same values.
    // Bodies that are not form-encoded are ignored.
    if let Ok(RawForm(body)) = form {
        params.merge_form(&body);
    }

    let Some(received_state) = params.state.as_deref() else {
        // Favicon probes and other stray requests.
        trace!("Ignoring callback request without state");
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(error) = &params.error {
        debug!(
            "Identity provider returned error {:?}: {}",
            error,
            params.error_description.as_deref().unwrap_or("no description")
        );
    }

    if !state.expected_state.matches(received_state) {
        debug!("Rejected OAuth callback with mismatched state");
        return (StatusCode::BAD_REQUEST, "Invalid state parameter").into_response();
    }

    let Some(code) = params.code else {
        debug!("Rejected OAuth callback without authorization code");
        return (StatusCode::BAD_REQUEST, "Missing authorization code").into_response();
    };

    match state.sender.lock().await.take() {
        Some(sender) => {
            if sender.send(code).is_err() {
                debug!("Login stopped waiting before the authorization code arrived");
            }
        }
        None => debug!("Authorization code already delivered, ignoring repeat callback"),
    }

    (StatusCode::OK, Html(LOGIN_SUCCESS_HTML)).into_response()
}

impl CallbackServerHandle {
    /// Stop accepting connections and wait for the server task to finish.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => error!("OAuth callback server task panicked: {e}"),
                Err(_) => {
                    warn!("OAuth callback server did not stop in time, aborting");
                    task.abort();
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for CallbackServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
