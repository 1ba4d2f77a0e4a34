//! Test fixtures providing pre-built test objects

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use crate::models::{AuthenticationResponse, Session, User};
use crate::session::codec::SessionCodec;
use crate::session::cookie::CookieConfig;
use crate::session::SessionManager;
use crate::settings::{
    ApplicationSettings, AuthkitSettings, ProviderSettings, SessionSettings,
};

use super::builders::TestSessionBuilder;
use super::constants::{
    TEST_COOKIE_PASSWORD, TEST_EMAIL, TEST_PROVIDER_URL, TEST_REDIRECT_URI, TEST_USER_ID,
};
use super::mock::MockAuthProvider;

/// Header segment of every test access token (`{"alg":"RS256","typ":"JWT"}`)
const JWT_HEADER: &str = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9";

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    #[must_use]
    pub fn user() -> User {
        User {
            id: TEST_USER_ID.to_string(),
            email: TEST_EMAIL.to_string(),
            email_verified: true,
            first_name: Some("Test".to_string()),
            last_name: Some("User".to_string()),
            profile_picture_url: None,
            created_at: Some("2024-01-01T00:00:00.000Z".to_string()),
            updated_at: None,
        }
    }

    /// Unsigned JWT carrying `claims` as payload
    #[must_use]
    pub fn access_token(claims: &Value) -> String {
        format!(
            "{JWT_HEADER}.{}.test-signature",
            general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    /// A standard one-hour session
    #[must_use]
    pub fn session() -> Session {
        TestSessionBuilder::new().build()
    }

    /// Provider response for a code or refresh exchange
    #[must_use]
    pub fn authentication_response(
        session_id: &str,
        organization_id: Option<&str>,
    ) -> AuthenticationResponse {
        let mut claims = json!({
            "sid": session_id,
            "exp": (Utc::now() + Duration::hours(1)).timestamp(),
        });
        if let Some(org_id) = organization_id {
            claims["org_id"] = json!(org_id);
        }

        AuthenticationResponse {
            access_token: Self::access_token(&claims),
            refresh_token: format!("refresh_{session_id}"),
            user: Self::user(),
            organization_id: organization_id.map(ToString::to_string),
            impersonator: None,
            oauth_tokens: None,
            authentication_method: Some("Password".to_string()),
        }
    }

    #[must_use]
    pub fn codec() -> SessionCodec {
        SessionCodec::new(TEST_COOKIE_PASSWORD).expect("test password is long enough")
    }

    /// Cookie configuration with default name and attributes
    #[must_use]
    pub fn cookie_config() -> CookieConfig {
        CookieConfig::default().with_fallback_url(TEST_REDIRECT_URI)
    }

    /// Session manager wired to a mock provider
    #[must_use]
    pub fn session_manager(provider: Arc<MockAuthProvider>) -> SessionManager {
        Self::session_manager_with_config(provider, Self::cookie_config())
    }

    #[must_use]
    pub fn session_manager_with_config(
        provider: Arc<MockAuthProvider>,
        cookie_config: CookieConfig,
    ) -> SessionManager {
        SessionManager::new(Self::codec(), cookie_config, provider, TEST_REDIRECT_URI)
    }

    /// Complete, valid settings
    #[must_use]
    pub fn settings() -> AuthkitSettings {
        AuthkitSettings {
            application: ApplicationSettings {
                redirect_uri: TEST_REDIRECT_URI.to_string(),
            },
            provider: ProviderSettings {
                client_id: "client_test".to_string(),
                api_key: "sk_test".to_string(),
                api_base_url: TEST_PROVIDER_URL.to_string(),
            },
            session: SessionSettings {
                cookie_password: TEST_COOKIE_PASSWORD.to_string(),
                ..SessionSettings::default()
            },
            ..AuthkitSettings::default()
        }
    }
}
