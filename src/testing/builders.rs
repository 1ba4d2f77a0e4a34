//! Fluent builders for creating customizable test objects

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

use crate::models::{Impersonator, OAuthTokens, Session};

use super::constants::TEST_SESSION_ID;
use super::fixtures::TestFixtures;

/// Builder for sessions whose access token carries custom claims
pub struct TestSessionBuilder {
    claims: Map<String, Value>,
    refresh_token: String,
    impersonator: Option<Impersonator>,
    oauth_tokens: Option<OAuthTokens>,
}

impl Default for TestSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSessionBuilder {
    /// Session valid for one hour with a session id and no organization
    #[must_use]
    pub fn new() -> Self {
        let mut claims = Map::new();
        claims.insert("sid".to_string(), json!(TEST_SESSION_ID));
        claims.insert(
            "exp".to_string(),
            json!((Utc::now() + Duration::hours(1)).timestamp()),
        );
        Self {
            claims,
            refresh_token: "test_refresh_token".to_string(),
            impersonator: None,
            oauth_tokens: None,
        }
    }

    #[must_use]
    pub fn with_session_id(self, sid: &str) -> Self {
        self.with_claim("sid", json!(sid))
    }

    #[must_use]
    pub fn with_organization(self, org_id: &str) -> Self {
        self.with_claim("org_id", json!(org_id))
    }

    #[must_use]
    pub fn with_role(self, role: &str) -> Self {
        self.with_claim("role", json!(role))
    }

    #[must_use]
    pub fn with_permissions(self, permissions: &[&str]) -> Self {
        self.with_claim("permissions", json!(permissions))
    }

    /// Access token that expired a minute ago
    #[must_use]
    pub fn expired(self) -> Self {
        self.with_claim("exp", json!((Utc::now() - Duration::minutes(1)).timestamp()))
    }

    /// Pad the access token with a custom claim of `length` characters
    #[must_use]
    pub fn with_claim_padding(self, length: usize) -> Self {
        self.with_claim("padding", json!("p".repeat(length)))
    }

    #[must_use]
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: &str) -> Self {
        self.refresh_token = refresh_token.to_string();
        self
    }

    #[must_use]
    pub fn with_impersonator(mut self, email: &str) -> Self {
        self.impersonator = Some(Impersonator {
            email: email.to_string(),
            reason: Some("support ticket".to_string()),
        });
        self
    }

    #[must_use]
    pub fn with_oauth_tokens(mut self, access_token: &str) -> Self {
        self.oauth_tokens = Some(OAuthTokens {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: None,
            scopes: vec!["openid".to_string()],
        });
        self
    }

    #[must_use]
    pub fn build(self) -> Session {
        Session {
            access_token: TestFixtures::access_token(&Value::Object(self.claims)),
            refresh_token: self.refresh_token,
            user: TestFixtures::user(),
            impersonator: self.impersonator,
            oauth_tokens: self.oauth_tokens,
        }
    }
}
