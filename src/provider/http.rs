//! reqwest-backed provider client for the hosted user-management API

use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::models::AuthenticationResponse;
use crate::provider::{AuthProvider, AuthorizationUrlOptions, ProviderError};
use crate::settings::{AuthkitSettings, ConfigError};

const AUTHENTICATE_PATH: &str = "/user_management/authenticate";
const AUTHORIZE_PATH: &str = "/user_management/authorize";
const LOGOUT_PATH: &str = "/user_management/sessions/logout";

/// Body field carrying a raw redirect the provider wants the browser sent to
const REDIRECT_HINT_FIELD: &str = "authkit_redirect_url";

#[derive(Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
enum GrantRequest<'a> {
    AuthorizationCode {
        client_id: &'a str,
        client_secret: &'a str,
        code: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        code_verifier: Option<&'a str>,
    },
    RefreshToken {
        client_id: &'a str,
        client_secret: &'a str,
        refresh_token: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        organization_id: Option<&'a str>,
    },
}

#[derive(Clone)]
pub struct HttpAuthProvider {
    client: reqwest::Client,
    base_url: Url,
    client_id: String,
    api_key: String,
    redirect_uri: String,
}

impl std::fmt::Debug for HttpAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthProvider")
            .field("base_url", &self.base_url.as_str())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl HttpAuthProvider {
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL
    pub fn new(
        base_url: &str,
        client_id: &str,
        api_key: &str,
        redirect_uri: &str,
    ) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url).map_err(|_| ConfigError::InvalidUrl {
            field: "provider.api_base_url",
            value: base_url.to_string(),
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            client_id: client_id.to_string(),
            api_key: api_key.to_string(),
            redirect_uri: redirect_uri.to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the configured API base URL is invalid
    pub fn from_settings(settings: &AuthkitSettings) -> Result<Self, ConfigError> {
        Self::new(
            &settings.provider.api_base_url,
            &settings.provider.client_id,
            &settings.provider.api_key,
            &settings.application.redirect_uri,
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::Configuration(format!("Invalid endpoint {path}: {e}")))
    }

    async fn authenticate(
        &self,
        grant: &GrantRequest<'_>,
    ) -> Result<AuthenticationResponse, ProviderError> {
        let url = self.endpoint(AUTHENTICATE_PATH)?;
        debug!("Authenticating against {url}");

        let response = self
            .client
            .post(url)
            .json(grant)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            let error = parse_error_body(status.as_u16(), &body);
            warn!("Authentication request rejected: {error}");
            return Err(error);
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

/// Turn a provider error body into a structured error
///
/// Tags come from `error` or `code`, descriptions from `error_description` or
/// `message`. Non-JSON bodies keep only the status.
#[must_use]
pub fn parse_error_body(status: u16, body: &str) -> ProviderError {
    let raw: Option<Value> = serde_json::from_str(body).ok();
    let field = |names: &[&str]| {
        raw.as_ref().and_then(|value| {
            names
                .iter()
                .find_map(|name| value.get(*name).and_then(Value::as_str))
                .map(ToString::to_string)
        })
    };

    ProviderError::Api {
        status,
        error: field(&["error", "code"]),
        description: field(&["error_description", "message"]),
        redirect_hint: field(&[REDIRECT_HINT_FIELD]),
        raw,
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn authenticate_with_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<AuthenticationResponse, ProviderError> {
        self.authenticate(&GrantRequest::AuthorizationCode {
            client_id: &self.client_id,
            client_secret: &self.api_key,
            code,
            code_verifier,
        })
        .await
    }

    async fn authenticate_with_refresh_token(
        &self,
        refresh_token: &str,
        organization_id: Option<&str>,
    ) -> Result<AuthenticationResponse, ProviderError> {
        self.authenticate(&GrantRequest::RefreshToken {
            client_id: &self.client_id,
            client_secret: &self.api_key,
            refresh_token,
            organization_id,
        })
        .await
    }

    fn get_authorization_url(
        &self,
        options: &AuthorizationUrlOptions,
    ) -> Result<String, ProviderError> {
        let mut url = self.endpoint(AUTHORIZE_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair(
                    "redirect_uri",
                    options.redirect_uri.as_deref().unwrap_or(&self.redirect_uri),
                )
                .append_pair("response_type", "code")
                .append_pair("provider", "authkit");

            if let Some(organization_id) = &options.organization_id {
                query.append_pair("organization_id", organization_id);
            }
            if let Some(screen_hint) = options.screen_hint {
                query.append_pair("screen_hint", screen_hint.as_str());
            }
            if let Some(login_hint) = &options.login_hint {
                query.append_pair("login_hint", login_hint);
            }
            if let Some(domain_hint) = &options.domain_hint {
                query.append_pair("domain_hint", domain_hint);
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
        let mut url = self.endpoint(LOGOUT_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("session_id", session_id);
            if let Some(return_to) = return_to {
                query.append_pair("return_to", return_to);
            }
        }
        Ok(url.into())
    }
}
