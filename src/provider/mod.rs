//! Authentication provider abstraction
//!
//! The session layer never talks to the identity provider directly. It is handed
//! an `Arc<dyn AuthProvider>` at construction and uses it to exchange codes,
//! refresh sessions and build authorization / logout URLs.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::models::AuthenticationResponse;

pub use http::HttpAuthProvider;

/// Provider error tag requiring an SSO sign-in
pub const SSO_REQUIRED: &str = "sso_required";
/// Provider error tag requiring MFA enrollment
pub const MFA_ENROLLMENT: &str = "mfa_enrollment";

// =============================================================================
// Errors
// =============================================================================

/// Provider call failures
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The provider answered with an error body
    Api {
        status: u16,
        /// Machine-readable `error` / `code` tag
        error: Option<String>,
        description: Option<String>,
        /// Raw redirect hint the provider wants the browser sent to
        redirect_hint: Option<String>,
        raw: Option<Value>,
    },
    /// The request never produced a response
    Transport(String),
    /// The response body could not be understood
    InvalidResponse(String),
    Configuration(String),
}

impl ProviderError {
    /// Build an API error from a tag, mostly for tests and mocks
    #[must_use]
    pub fn api(status: u16, error: &str) -> Self {
        Self::Api {
            status,
            error: Some(error.to_string()),
            description: None,
            redirect_hint: None,
            raw: None,
        }
    }

    #[must_use]
    pub fn error_tag(&self) -> Option<&str> {
        match self {
            Self::Api { error, .. } => error.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn redirect_hint(&self) -> Option<&str> {
        match self {
            Self::Api { redirect_hint, .. } => redirect_hint.as_deref(),
            _ => None,
        }
    }

    /// Whether the error asks for additional authentication
    #[must_use]
    pub fn is_step_up(&self) -> bool {
        matches!(self.error_tag(), Some(SSO_REQUIRED | MFA_ENROLLMENT))
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api {
                status,
                error,
                description,
                ..
            } => {
                write!(f, "Provider error ({status})")?;
                if let Some(tag) = error {
                    write!(f, " {tag}")?;
                }
                if let Some(description) = description {
                    write!(f, ": {description}")?;
                }
                Ok(())
            }
            Self::Transport(msg) => write!(f, "Provider request failed: {msg}"),
            Self::InvalidResponse(msg) => write!(f, "Invalid provider response: {msg}"),
            Self::Configuration(msg) => write!(f, "Provider configuration error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

// =============================================================================
// Authorization URL options
// =============================================================================

/// Which hosted screen the authorization URL opens on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenHint {
    SignIn,
    SignUp,
}

impl ScreenHint {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignIn => "sign-in",
            Self::SignUp => "sign-up",
        }
    }
}

/// Parameters of an authorization request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationUrlOptions {
    pub organization_id: Option<String>,
    pub screen_hint: Option<ScreenHint>,
    pub login_hint: Option<String>,
    pub domain_hint: Option<String>,
    pub state: Option<String>,
    /// S256 PKCE challenge
    pub code_challenge: Option<String>,
    /// Overrides the configured redirect URI
    pub redirect_uri: Option<String>,
}

// =============================================================================
// Provider trait
// =============================================================================

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange an authorization code (and PKCE verifier) for a session
    ///
    /// # Errors
    ///
    /// Returns the provider's error on a rejected or failed exchange
    async fn authenticate_with_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<AuthenticationResponse, ProviderError>;

    /// Obtain a new session from a refresh token, optionally switching organization
    ///
    /// # Errors
    ///
    /// Returns the provider's error, including step-up tags such as `sso_required`
    async fn authenticate_with_refresh_token(
        &self,
        refresh_token: &str,
        organization_id: Option<&str>,
    ) -> Result<AuthenticationResponse, ProviderError>;

    /// # Errors
    ///
    /// Returns an error if the URL cannot be built from configuration
    fn get_authorization_url(&self, options: &AuthorizationUrlOptions)
        -> Result<String, ProviderError>;

    /// # Errors
    ///
    /// Returns an error if the URL cannot be built from configuration
    fn get_logout_url(&self, session_id: &str, return_to: Option<&str>)
        -> Result<String, ProviderError>;
}
