//! Mock objects and fake implementations for testing
//!
//! [`MockAuthProvider`] stands in for the hosted authentication API. Results
//! are scripted through queues; once a queue is empty the mock falls back to
//! a successful response.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::models::AuthenticationResponse;
use crate::provider::{AuthProvider, AuthorizationUrlOptions, ProviderError};

use super::constants::{TEST_PROVIDER_URL, TEST_REDIRECT_URI};
use super::fixtures::TestFixtures;

type ProviderResult = Result<AuthenticationResponse, ProviderError>;

/// Recorded `(token_or_code, second_argument)` pairs
type CallLog = Mutex<Vec<(String, Option<String>)>>;

/// In-memory `AuthProvider` with scripted responses and call recording
#[derive(Default)]
pub struct MockAuthProvider {
    refresh_results: Mutex<VecDeque<ProviderResult>>,
    code_results: Mutex<VecDeque<ProviderResult>>,
    refresh_calls: CallLog,
    code_calls: CallLog,
    issued: AtomicUsize,
}

impl MockAuthProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next refresh-token exchange
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn push_refresh(&self, result: ProviderResult) {
        self.refresh_results
            .lock()
            .expect("mock lock poisoned")
            .push_back(result);
    }

    /// Queue the result of the next code exchange
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn push_code(&self, result: ProviderResult) {
        self.code_results
            .lock()
            .expect("mock lock poisoned")
            .push_back(result);
    }

    /// `(refresh_token, organization_id)` of every refresh call so far
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn refresh_calls(&self) -> Vec<(String, Option<String>)> {
        self.refresh_calls.lock().expect("mock lock poisoned").clone()
    }

    /// `(code, code_verifier)` of every code exchange so far
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn code_calls(&self) -> Vec<(String, Option<String>)> {
        self.code_calls.lock().expect("mock lock poisoned").clone()
    }

    fn next_session_id(&self, prefix: &str) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        format!("session_{prefix}_{n}")
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn authenticate_with_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> ProviderResult {
        self.code_calls
            .lock()
            .expect("mock lock poisoned")
            .push((code.to_string(), code_verifier.map(ToString::to_string)));

        let scripted = self.code_results.lock().expect("mock lock poisoned").pop_front();
        scripted.unwrap_or_else(|| {
            Ok(TestFixtures::authentication_response(
                &self.next_session_id("code"),
                None,
            ))
        })
    }

    async fn authenticate_with_refresh_token(
        &self,
        refresh_token: &str,
        organization_id: Option<&str>,
    ) -> ProviderResult {
        self.refresh_calls.lock().expect("mock lock poisoned").push((
            refresh_token.to_string(),
            organization_id.map(ToString::to_string),
        ));

        let scripted = self
            .refresh_results
            .lock()
            .expect("mock lock poisoned")
            .pop_front();
        scripted.unwrap_or_else(|| {
            Ok(TestFixtures::authentication_response(
                &self.next_session_id("refreshed"),
                organization_id,
            ))
        })
    }

    fn get_authorization_url(
        &self,
        options: &AuthorizationUrlOptions,
    ) -> Result<String, ProviderError> {
        let mut url = Url::parse(TEST_PROVIDER_URL)
            .and_then(|base| base.join("/user_management/authorize"))
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", "client_test")
                .append_pair(
                    "redirect_uri",
                    options.redirect_uri.as_deref().unwrap_or(TEST_REDIRECT_URI),
                )
                .append_pair("response_type", "code")
                .append_pair("provider", "authkit");
            if let Some(org) = &options.organization_id {
                query.append_pair("organization_id", org);
            }
            if let Some(hint) = options.screen_hint {
                query.append_pair("screen_hint", hint.as_str());
            }
            if let Some(login_hint) = &options.login_hint {
                query.append_pair("login_hint", login_hint);
            }
            if let Some(state) = &options.state {
                query.append_pair("state", state);
            }
            if let Some(challenge) = &options.code_challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
        }
        Ok(url.into())
    }

    fn get_logout_url(
        &self,
        session_id: &str,
        return_to: Option<&str>,
    ) -> Result<String, ProviderError> {
        let mut url = Url::parse(TEST_PROVIDER_URL)
            .and_then(|base| base.join("/user_management/sessions/logout"))
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;
        url.query_pairs_mut().append_pair("session_id", session_id);
        if let Some(return_to) = return_to {
            url.query_pairs_mut().append_pair("return_to", return_to);
        }
        Ok(url.into())
    }
}
