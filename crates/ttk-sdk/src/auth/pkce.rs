//! PKCE (RFC 7636) material for a single authorization attempt

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use oauth2::{PkceCodeChallenge, PkceCodeVerifier};
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;
use zeroize::Zeroizing;

/// Verifier length, the maximum RFC 7636 allows
pub const CODE_VERIFIER_LEN: usize = 128;

const STATE_BYTES: usize = 32;

/// RFC 3986 unreserved characters
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// One login attempt's verifier, challenge and anti-forgery state.
///
/// The verifier never leaves this value except through
/// [`PkceAttempt::into_verifier`], which consumes the attempt.
pub struct PkceAttempt {
    code_verifier: Zeroizing<String>,
    code_challenge: PkceCodeChallenge,
    state: String,
    created_at: Instant,
    redirect_uri: String,
}

impl PkceAttempt {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        let code_verifier = Zeroizing::new(generate_verifier());
        let code_challenge = PkceCodeChallenge::from_code_verifier_sha256(
            &PkceCodeVerifier::new(code_verifier.to_string()),
        );
        let state = generate_state();
        debug!("Generated PKCE attempt");

        Self {
            code_verifier,
            code_challenge,
            state,
            created_at: Instant::now(),
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn code_challenge(&self) -> &str {
        self.code_challenge.as_str()
    }

    /// Challenge in the form the authorize request builder takes
    pub fn pkce_challenge(&self) -> &PkceCodeChallenge {
        &self.code_challenge
    }

    /// Always `S256`; the plain method is never offered
    pub fn challenge_method(&self) -> &str {
        self.code_challenge.method().as_str()
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_expired(&self, window: Duration) -> bool {
        self.created_at.elapsed() >= window
    }

    /// Release the verifier for the token exchange, ending the attempt
    pub fn into_verifier(self) -> Zeroizing<String> {
        self.code_verifier
    }
}

impl fmt::Debug for PkceAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceAttempt")
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge.as_str())
            .field("state", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

fn generate_verifier() -> String {
    (0..CODE_VERIFIER_LEN)
        .map(|_| UNRESERVED[OsRng.gen_range(0..UNRESERVED.len())] as char)
        .collect()
}

fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// base64url(SHA-256(verifier)) without padding
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_shape() {
        let attempt = PkceAttempt::new("http://127.0.0.1:1234/callback");
        let challenge = attempt.code_challenge().to_string();
        let verifier = attempt.into_verifier();

        assert_eq!(verifier.len(), CODE_VERIFIER_LEN);
        assert!(verifier.bytes().all(|b| UNRESERVED.contains(&b)));
        assert_eq!(challenge_for(&verifier), challenge);
    }

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        assert_eq!(
            challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_attempts_are_independent() {
        let a = PkceAttempt::new("http://127.0.0.1/callback");
        let b = PkceAttempt::new("http://127.0.0.1/callback");

        assert_ne!(a.state(), b.state());
        assert_ne!(a.code_challenge(), b.code_challenge());
        assert_eq!(a.state().len(), 43);
        assert_eq!(a.challenge_method(), "S256");
    }

    #[test]
    fn test_expiry_window() {
        let attempt = PkceAttempt::new("http://127.0.0.1/callback");
        assert!(!attempt.is_expired(Duration::from_secs(120)));
        assert!(attempt.is_expired(Duration::ZERO));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let attempt = PkceAttempt::new("http://127.0.0.1/callback");
        let state = attempt.state().to_string();
        let debug = format!("{attempt:?}");
        assert!(!debug.contains(&state));
        let verifier = attempt.into_verifier();
        assert!(!debug.contains(verifier.as_str()));
    }
}
