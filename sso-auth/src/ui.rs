//! User-facing output sink.
//!
//! Messages a person must read to complete a login (the authorization URL, the
//! waiting notice) go through a [`Ui`] passed to the orchestrator rather than to
//! a process-wide writer. Diagnostics go through `log`.

use std::sync::Mutex;

/// Destination for messages meant for the person running the login.
pub trait Ui: Send + Sync {
    fn output(&self, message: &str);
}

/// Discards everything. Used when the caller does not supply a sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUi;

impl Ui for NoopUi {
    fn output(&self, _message: &str) {}
}

/// Collects messages in memory; handy when embedding the login flow.
#[derive(Debug, Default)]
pub struct BufferedUi {
    messages: Mutex<Vec<String>>,
}

impl BufferedUi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages written so far.
    pub fn messages(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Ui for BufferedUi {
    fn output(&self, message: &str) {
        match self.messages.lock() {
            Ok(mut messages) => messages.push(message.to_string()),
            Err(poisoned) => poisoned.into_inner().push(message.to_string()),
        }
    }
}
