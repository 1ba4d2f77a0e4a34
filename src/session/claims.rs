//! Unverified access-token claim decoding
//!
//! The access token is a signed JWT whose payload carries the session id,
//! organization and authorization data. Claims are read without checking the
//! signature: they are informational, and only ever trusted when the token
//! came out of a sealed session.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::crypto::decode_base64url_segment;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("Invalid JWT format: expected 3 segments, got {0}")]
    Format(usize),
    #[error("Invalid JWT payload encoding: {0}")]
    Decode(String),
    #[error("Invalid JWT payload JSON: {0}")]
    Parse(String),
}

/// Projection of the access token payload
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AccessTokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitlements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_flags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Custom claims added by the provider's JWT template
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccessTokenClaims {
    /// Whether `exp` has passed, treating tokens within `leeway_seconds` of
    /// expiry as already expired
    ///
    /// Tokens without `exp` never expire locally.
    #[must_use]
    pub fn is_expired(&self, leeway_seconds: i64) -> bool {
        self.exp
            .is_some_and(|exp| exp <= Utc::now().timestamp().saturating_add(leeway_seconds))
    }

    /// Look up a custom claim
    #[must_use]
    pub fn custom(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// Decode the claims of an access token without verifying it
///
/// An absent or empty token yields an empty claim set.
///
/// # Errors
///
/// - `ClaimsError::Format` unless the token has exactly three dot-separated segments
/// - `ClaimsError::Decode` if the payload segment is not base64url
/// - `ClaimsError::Parse` if the payload is not a JSON object of claims
pub fn decode_claims(access_token: Option<&str>) -> Result<AccessTokenClaims, ClaimsError> {
    let Some(token) = access_token.filter(|t| !t.is_empty()) else {
        return Ok(AccessTokenClaims::default());
    };

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(ClaimsError::Format(segments.len()));
    }

    let payload =
        decode_base64url_segment(segments[1]).map_err(|e| ClaimsError::Decode(e.to_string()))?;

    serde_json::from_slice(&payload).map_err(|e| ClaimsError::Parse(e.to_string()))
}
