use serde::{Deserialize, Serialize};

use crate::utils::crypto::{generate_nonce, pkce_challenge};

/// Bytes of entropy in the code verifier (43 base64url characters)
const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;

/// Transient state binding an authorization request to its callback
///
/// Sealed into the `authkit-verifier` cookie for the duration of the sign-in
/// round trip.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PkceState {
    pub code_verifier: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_pathname: Option<String>,
}

impl PkceState {
    #[must_use]
    pub fn generate(return_pathname: Option<&str>) -> Self {
        Self {
            code_verifier: generate_nonce(VERIFIER_BYTES),
            state: generate_nonce(STATE_BYTES),
            return_pathname: return_pathname.map(ToString::to_string),
        }
    }

    /// S256 code challenge sent with the authorization request
    #[must_use]
    pub fn code_challenge(&self) -> String {
        pkce_challenge(&self.code_verifier)
    }

    /// Constant-time comparison of the callback `state` parameter
    #[must_use]
    pub fn matches_state(&self, state: &str) -> bool {
        let expected = self.state.as_bytes();
        let actual = state.as_bytes();
        expected.len() == actual.len()
            && expected
                .iter()
                .zip(actual)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_pkce_state() {
        let pkce = PkceState::generate(Some("/dashboard"));
        assert_eq!(pkce.code_verifier.len(), 43);
        assert_eq!(pkce.state.len(), 22);
        assert_eq!(pkce.return_pathname.as_deref(), Some("/dashboard"));
        assert_ne!(pkce.code_verifier, PkceState::generate(None).code_verifier);
    }

    #[test]
    fn test_code_challenge_is_s256() {
        let pkce = PkceState {
            code_verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
            state: "state".to_string(),
            return_pathname: None,
        };
        assert_eq!(
            pkce.code_challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_matches_state() {
        let pkce = PkceState::generate(None);
        let state = pkce.state.clone();
        assert!(pkce.matches_state(&state));
        assert!(!pkce.matches_state("other"));
        assert!(!pkce.matches_state(""));
    }
}
