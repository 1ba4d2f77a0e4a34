use serde::{Deserialize, Serialize};

/// Identity record returned by the provider and stored inside the sealed session
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl User {
    /// Display name built from the first and last name, if any
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(name), None) | (None, Some(name)) => Some(name.to_string()),
            (None, None) => None,
        }
    }
}

/// The administrator impersonating the user, when an impersonation session is active
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Impersonator {
    pub email: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Tokens issued by an upstream OAuth provider (e.g. Google) during sign-in
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Session structure sealed into the session cookie
///
/// The whole record is replaced on refresh or organization switch; it is never
/// patched field by field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonator: Option<Impersonator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_tokens: Option<OAuthTokens>,
}

/// Successful response of a code or refresh-token authentication
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub impersonator: Option<Impersonator>,
    #[serde(default)]
    pub oauth_tokens: Option<OAuthTokens>,
    #[serde(default)]
    pub authentication_method: Option<String>,
}

impl From<AuthenticationResponse> for Session {
    fn from(response: AuthenticationResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            user: response.user,
            impersonator: response.impersonator,
            oauth_tokens: response.oauth_tokens,
        }
    }
}
