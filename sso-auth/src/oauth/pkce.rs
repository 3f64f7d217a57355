//! PKCE (Proof Key for Code Exchange) support for OAuth 2.0.
//!
//! Implements the S256 method of RFC 7636 for securing the authorization code
//! flow of a public, installed client.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Value sent as `code_challenge_method`.
pub const CHALLENGE_METHOD: &str = "S256";

/// PKCE code verifier (random string).
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Generate a new random PKCE verifier.
    ///
    /// 32 random bytes, base64url encoded without padding: 43 characters
    /// carrying 256 bits of entropy.
    pub fn generate() -> Self {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        let verifier = URL_SAFE_NO_PAD.encode(random_bytes);
        Self(verifier)
    }

    /// Create a PKCE verifier from an existing string.
    pub fn from_string(verifier: String) -> Self {
        Self(verifier)
    }

    /// Get the verifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generate the corresponding code challenge.
    pub fn challenge(&self) -> PkceChallenge {
        PkceChallenge::from_verifier(self)
    }
}

/// PKCE code challenge (SHA256 hash of verifier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Create a code challenge from a verifier.
    ///
    /// Uses SHA256 hashing and base64url encoding as per RFC 7636.
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_str().as_bytes());
        let hash = hasher.finalize();
        let challenge = URL_SAFE_NO_PAD.encode(hash);
        Self(challenge)
    }

    /// Get the challenge string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_pkce_verifier_generation() {
        let verifier = PkceVerifier::generate();
        assert_eq!(verifier.as_str().len(), 43);
        assert!(verifier
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_pkce_challenge_matches_rfc7636_vector() {
        // Appendix B of RFC 7636
        let verifier =
            PkceVerifier::from_string("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(
            verifier.challenge().as_str(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_pkce_challenge_deterministic() {
        let verifier = PkceVerifier::from_string("test_verifier".to_string());
        let challenge1 = verifier.challenge();
        let challenge2 = verifier.challenge();
        assert_eq!(challenge1, challenge2);
    }

    #[test]
    fn test_pkce_verifiers_do_not_collide() {
        let verifiers: HashSet<String> = (0..10_000)
            .map(|_| PkceVerifier::generate().as_str().to_string())
            .collect();
        assert_eq!(verifiers.len(), 10_000);
    }
}
