//! CSRF state for a single login attempt.
//!
//! Unlike a server-side flow there is no store of outstanding states: each
//! login owns exactly one value and the callback server compares against it.

use std::fmt;

use rand::Rng;

/// Opaque correlation token sent as the OAuth `state` parameter.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestState(String);

impl RequestState {
    /// Generate a cryptographically random state token.
    pub fn generate() -> Self {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        Self(hex::encode(random_bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `candidate` is exactly this state. Comparison is
    /// case-sensitive.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

// Keep the full token out of debug logs.
impl fmt::Debug for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestState({}…)", &self.0[..8.min(self.0.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_state() {
        let state = RequestState::generate();
        assert_eq!(state.as_str().len(), 64); // 32 bytes hex encoded
    }

    #[test]
    fn test_states_do_not_collide() {
        let states: HashSet<String> = (0..10_000)
            .map(|_| RequestState::generate().as_str().to_string())
            .collect();
        assert_eq!(states.len(), 10_000);
    }

    #[test]
    fn test_matches_is_case_sensitive() {
        let state = RequestState::generate();
        assert!(state.matches(state.as_str()));
        assert!(!state.matches(&state.as_str().to_uppercase()));
        assert!(!state.matches(""));
    }

    #[test]
    fn test_debug_truncates() {
        let state = RequestState::generate();
        let debug = format!("{:?}", state);
        assert!(!debug.contains(state.as_str()));
    }
}
