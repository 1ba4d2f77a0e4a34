//! Session Manager - Stateless Sealed Session Lifecycle
//!
//! The `SessionManager` owns the read → validate → refresh → persist cycle.
//! The cookie is the only durable state: every operation takes the inbound
//! cookie map and returns the cookie writes the response must carry.
//!
//! ## Organization
//!
//! 1. **Types and Error Handling**
//! 2. **Construction**
//! 3. **Reading** - reassemble, unseal, decode claims
//! 4. **Writing** - seal, chunk, clear
//! 5. **Refresh** - refresh, organization switch, step-up
//! 6. **Sign-in / Callback / Sign-out**
//! 7. **Request Authentication** - middleware flow
//! 8. **Tests**

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::http::header::HeaderMap;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::{debug, info, warn};

use crate::models::{Impersonator, OAuthTokens, Session, User};
use crate::provider::{AuthProvider, AuthorizationUrlOptions, ProviderError, ScreenHint};
use crate::session::chunker::{chunk_value, read_value, stored_cookie_names};
use crate::session::claims::{decode_claims, AccessTokenClaims, ClaimsError};
use crate::session::codec::SessionCodec;
use crate::session::cookie::{
    compute_cookie_attributes, CookieAttributes, CookieConfig, CookieWrite, SameSitePolicy,
    PKCE_COOKIE_NAME, PKCE_MAX_AGE_SECONDS,
};
use crate::session::pkce::PkceState;
use crate::settings::{AuthkitSettings, ConfigError};
use crate::utils::header_processor::{
    cookie_headers, set_internal_header, strip_internal_headers, REDIRECT_URI_HEADER,
    SESSION_HEADER, URL_HEADER,
};
use crate::utils::redirect::{sanitize_return_pathname, trusted_redirect, Redirect};
use crate::utils::request::{MiddlewareOptions, OptionsSource, RequestContext};

// =============================================================================
// Types and Error Handling
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found")]
    NoSession,
    #[error("Invalid sign-in state: {0}")]
    InvalidState(String),
    #[error(transparent)]
    Claims(#[from] ClaimsError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Failed to seal session: {0}")]
    Seal(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ResponseError for SessionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NoSession => StatusCode::UNAUTHORIZED,
            Self::InvalidState(_) | Self::Claims(_) => StatusCode::BAD_REQUEST,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Seal(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, message) = match self {
            Self::NoSession => ("unauthorized", "Session not found".to_string()),
            Self::InvalidState(_) | Self::Claims(_) => ("bad_request", self.to_string()),
            Self::Provider(_) => ("bad_gateway", "Authentication provider error".to_string()),
            Self::Seal(_) | Self::Config(_) => {
                ("internal_server_error", "Session processing failed".to_string())
            }
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": error,
            "message": message,
        }))
    }
}

/// A live session with its decoded claims and sealed form
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedSession {
    pub session: Session,
    pub claims: AccessTokenClaims,
    pub sealed: String,
}

impl AuthenticatedSession {
    #[must_use]
    pub const fn user(&self) -> &User {
        &self.session.user
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.claims.sid.as_deref()
    }

    #[must_use]
    pub fn organization_id(&self) -> Option<&str> {
        self.claims.org_id.as_deref()
    }

    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.claims.role.as_deref()
    }

    #[must_use]
    pub fn roles(&self) -> &[String] {
        self.claims.roles.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn permissions(&self) -> &[String] {
        self.claims.permissions.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn entitlements(&self) -> &[String] {
        self.claims.entitlements.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn feature_flags(&self) -> &[String] {
        self.claims.feature_flags.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub const fn impersonator(&self) -> Option<&Impersonator> {
        self.session.impersonator.as_ref()
    }

    #[must_use]
    pub const fn oauth_tokens(&self) -> Option<&OAuthTokens> {
        self.session.oauth_tokens.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    NoSession,
    Authenticated(Box<AuthenticatedSession>),
}

impl SessionState {
    #[must_use]
    pub fn authenticated(&self) -> Option<&AuthenticatedSession> {
        match self {
            Self::Authenticated(session) => Some(&**session),
            Self::NoSession => None,
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The session was replaced; `cookies` rewrites every chunk
    Refreshed {
        session: Box<AuthenticatedSession>,
        cookies: Vec<CookieWrite>,
    },
    /// The provider wants the user sent through sign-in again
    StepUpRequired {
        authorization_url: String,
        organization_id: Option<String>,
        /// PKCE verifier cookie for the computed authorization URL
        cookies: Vec<CookieWrite>,
    },
}

/// Parameters of `SessionManager::sign_in_url`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInOptions {
    pub organization_id: Option<String>,
    pub screen_hint: Option<ScreenHint>,
    pub login_hint: Option<String>,
    pub return_pathname: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignInRedirect {
    pub url: String,
    pub cookies: Vec<CookieWrite>,
}

#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub session: Box<AuthenticatedSession>,
    pub cookies: Vec<CookieWrite>,
    pub return_pathname: String,
    pub organization_id: Option<String>,
    pub authentication_method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignOutOutcome {
    pub redirect_url: Option<String>,
    pub cookies: Vec<CookieWrite>,
}

/// Result of the middleware flow for one request
#[derive(Debug, Clone)]
pub struct AuthenticatedRequest {
    pub state: SessionState,
    /// Headers to forward to downstream handlers, internal headers included
    pub request_headers: HeaderMap,
    /// Headers the response must carry (`set-cookie`)
    pub response_headers: HeaderMap,
    pub redirect: Option<Redirect>,
}

// =============================================================================
// Construction
// =============================================================================

/// Stateless sealed-session manager
#[derive(Clone)]
pub struct SessionManager {
    codec: SessionCodec,
    cookie_config: CookieConfig,
    provider: Arc<dyn AuthProvider>,
    redirect_uri: String,
    auto_refresh: bool,
    refresh_leeway_seconds: i64,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("cookie_config", &self.cookie_config)
            .field("redirect_uri", &self.redirect_uri)
            .field("auto_refresh", &self.auto_refresh)
            .field("refresh_leeway_seconds", &self.refresh_leeway_seconds)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(
        codec: SessionCodec,
        cookie_config: CookieConfig,
        provider: Arc<dyn AuthProvider>,
        redirect_uri: &str,
    ) -> Self {
        Self {
            codec,
            cookie_config,
            provider,
            redirect_uri: redirect_uri.to_string(),
            auto_refresh: true,
            refresh_leeway_seconds: 0,
        }
    }

    /// Build a manager from validated settings
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found
    pub fn from_settings(
        settings: &AuthkitSettings,
        provider: Arc<dyn AuthProvider>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let codec = SessionCodec::new(&settings.session.cookie_password)?;
        Ok(Self::new(
            codec,
            settings.cookie_config()?,
            provider,
            &settings.application.redirect_uri,
        )
        .with_auto_refresh(settings.session.auto_refresh)
        .with_refresh_leeway(settings.session.refresh_leeway_seconds))
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    #[must_use]
    pub fn with_refresh_leeway(mut self, seconds: i64) -> Self {
        self.refresh_leeway_seconds = seconds;
        self
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_config.name
    }

    #[must_use]
    pub const fn cookie_config(&self) -> &CookieConfig {
        &self.cookie_config
    }

    #[must_use]
    pub const fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Attributes for session cookies on a response to `target_url`
    #[must_use]
    pub fn cookie_attributes(&self, target_url: Option<&str>) -> CookieAttributes {
        compute_cookie_attributes(target_url, &self.cookie_config, false)
    }

    /// Attributes for the PKCE verifier cookie
    ///
    /// The callback arrives through a cross-site top-level navigation, so a
    /// `Strict` policy is relaxed to `Lax` for this cookie.
    fn pkce_attributes(&self, target_url: Option<&str>) -> CookieAttributes {
        let mut attributes = self
            .cookie_attributes(target_url)
            .with_max_age(PKCE_MAX_AGE_SECONDS);
        if attributes.same_site == SameSitePolicy::Strict {
            attributes.same_site = SameSitePolicy::Lax;
        }
        attributes
    }
}

// =============================================================================
// Reading
// =============================================================================

impl SessionManager {
    /// Reassembled sealed session string, if any
    #[must_use]
    pub fn read_sealed(&self, cookies: &HashMap<String, String>) -> Option<String> {
        read_value(&self.cookie_config.name, cookies)
    }

    /// Reassemble and unseal; a missing or corrupt session is `None`
    #[must_use]
    pub fn read_session(&self, cookies: &HashMap<String, String>) -> Option<Session> {
        self.read_sealed(cookies)
            .and_then(|sealed| self.codec.unseal(&sealed))
    }

    /// Read the session and decode its claims
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Claims` if the sealed access token is not a JWT
    pub fn load(&self, cookies: &HashMap<String, String>) -> Result<SessionState, SessionError> {
        match self.read_sealed(cookies) {
            Some(sealed) => self.state_from_sealed(&sealed),
            None => Ok(SessionState::NoSession),
        }
    }

    /// Interpret a sealed session string
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Claims` if the sealed access token is not a JWT
    pub fn state_from_sealed(&self, sealed: &str) -> Result<SessionState, SessionError> {
        let Some(session) = self.codec.unseal(sealed) else {
            return Ok(SessionState::NoSession);
        };
        let claims = decode_claims(Some(&session.access_token))?;
        Ok(SessionState::Authenticated(Box::new(AuthenticatedSession {
            session,
            claims,
            sealed: sealed.to_string(),
        })))
    }

    /// Read the session a previous `authenticate_request` forwarded in the
    /// internal session header, falling back to cookies
    ///
    /// Only trust the header on requests that went through
    /// `authenticate_request`, which strips client-supplied copies.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Claims` if the sealed access token is not a JWT
    pub fn session_from_headers(
        &self,
        headers: &HeaderMap,
        cookies: &HashMap<String, String>,
    ) -> Result<SessionState, SessionError> {
        match headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            Some(sealed) if !sealed.is_empty() => self.state_from_sealed(sealed),
            _ => self.load(cookies),
        }
    }
}

// =============================================================================
// Writing
// =============================================================================

impl SessionManager {
    /// Seal a session and produce the cookie writes storing it
    ///
    /// Stale chunks from a longer previous value are cleared in the same list.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Seal` if encryption fails
    pub fn write_session(
        &self,
        session: &Session,
        cookies: &HashMap<String, String>,
        target_url: Option<&str>,
    ) -> Result<Vec<CookieWrite>, SessionError> {
        let sealed = self.seal(session)?;
        Ok(self.sealed_cookie_writes(&sealed, cookies, target_url))
    }

    /// Cookie writes deleting the session and every chunk of it
    #[must_use]
    pub fn clear_session(
        &self,
        cookies: &HashMap<String, String>,
        target_url: Option<&str>,
    ) -> Vec<CookieWrite> {
        let attributes = self.cookie_attributes(target_url);
        let name = &self.cookie_config.name;

        let mut names = stored_cookie_names(name, cookies);
        if !names.contains(name) {
            names.insert(0, name.clone());
        }
        names
            .iter()
            .map(|cookie_name| CookieWrite::delete(cookie_name, &attributes))
            .collect()
    }

    fn seal(&self, session: &Session) -> Result<String, SessionError> {
        self.codec
            .seal(session)
            .map_err(|e| SessionError::Seal(e.to_string()))
    }

    fn sealed_cookie_writes(
        &self,
        sealed: &str,
        cookies: &HashMap<String, String>,
        target_url: Option<&str>,
    ) -> Vec<CookieWrite> {
        let attributes = self.cookie_attributes(target_url);
        let writes: Vec<CookieWrite> = chunk_value(&self.cookie_config.name, sealed, cookies)
            .into_iter()
            .map(|chunk| {
                if chunk.clear {
                    CookieWrite::delete(&chunk.name, &attributes)
                } else {
                    CookieWrite::set(&chunk.name, &chunk.value, &attributes)
                }
            })
            .collect();
        debug!(
            "Session sealed into {} chars, {} cookie writes",
            sealed.len(),
            writes.len()
        );
        writes
    }

    /// Seal a fresh session and decode its claims
    fn persist(
        &self,
        session: Session,
        cookies: &HashMap<String, String>,
        target_url: Option<&str>,
    ) -> Result<(AuthenticatedSession, Vec<CookieWrite>), SessionError> {
        let claims = decode_claims(Some(&session.access_token))?;
        let sealed = self.seal(&session)?;
        let writes = self.sealed_cookie_writes(&sealed, cookies, target_url);
        Ok((
            AuthenticatedSession {
                session,
                claims,
                sealed,
            },
            writes,
        ))
    }
}

// =============================================================================
// Refresh
// =============================================================================

impl SessionManager {
    /// Refresh the current session
    ///
    /// The organization defaults to the `org_id` claim of the current access
    /// token. On success the whole session is replaced and every chunk rewritten.
    ///
    /// # Errors
    ///
    /// - `SessionError::NoSession` without a readable session
    /// - `SessionError::Provider` for provider failures other than step-up
    pub async fn refresh_session(
        &self,
        cookies: &HashMap<String, String>,
        organization_id: Option<&str>,
        target_url: Option<&str>,
    ) -> Result<RefreshOutcome, SessionError> {
        let session = self.read_session(cookies).ok_or(SessionError::NoSession)?;
        let claims = decode_claims(Some(&session.access_token))?;
        let organization_id = organization_id
            .map(ToString::to_string)
            .or(claims.org_id);

        self.refresh_with(&session, organization_id.as_deref(), cookies, target_url)
            .await
    }

    /// Refresh into another organization
    ///
    /// # Errors
    ///
    /// See `refresh_session`
    pub async fn switch_to_organization(
        &self,
        cookies: &HashMap<String, String>,
        organization_id: &str,
        target_url: Option<&str>,
    ) -> Result<RefreshOutcome, SessionError> {
        info!("Switching session to organization {organization_id}");
        self.refresh_session(cookies, Some(organization_id), target_url)
            .await
    }

    async fn refresh_with(
        &self,
        session: &Session,
        organization_id: Option<&str>,
        cookies: &HashMap<String, String>,
        target_url: Option<&str>,
    ) -> Result<RefreshOutcome, SessionError> {
        match self
            .provider
            .authenticate_with_refresh_token(&session.refresh_token, organization_id)
            .await
        {
            Ok(response) => {
                let (refreshed, writes) =
                    self.persist(Session::from(response), cookies, target_url)?;
                info!("Refreshed session for user {}", refreshed.session.user.id);
                Ok(RefreshOutcome::Refreshed {
                    session: Box::new(refreshed),
                    cookies: writes,
                })
            }
            Err(error) if error.is_step_up() => {
                info!(
                    "Provider requires step-up ({}) for organization {}",
                    error.error_tag().unwrap_or_default(),
                    organization_id.unwrap_or("<none>")
                );
                self.step_up(&error, organization_id, target_url)
            }
            Err(error) => {
                warn!("Session refresh failed: {error}");
                Err(error.into())
            }
        }
    }

    /// An explicit provider redirect hint wins over a computed authorization URL
    fn step_up(
        &self,
        error: &ProviderError,
        organization_id: Option<&str>,
        target_url: Option<&str>,
    ) -> Result<RefreshOutcome, SessionError> {
        if let Some(hint) = error.redirect_hint() {
            return Ok(RefreshOutcome::StepUpRequired {
                authorization_url: hint.to_string(),
                organization_id: organization_id.map(ToString::to_string),
                cookies: Vec::new(),
            });
        }

        let return_pathname = target_url
            .and_then(|url| url::Url::parse(url).ok())
            .map(|url| url.path().to_string());
        let sign_in = self.sign_in_url(
            &SignInOptions {
                organization_id: organization_id.map(ToString::to_string),
                return_pathname,
                ..SignInOptions::default()
            },
            target_url,
        )?;

        Ok(RefreshOutcome::StepUpRequired {
            authorization_url: sign_in.url,
            organization_id: organization_id.map(ToString::to_string),
            cookies: sign_in.cookies,
        })
    }
}

// =============================================================================
// Sign-in / Callback / Sign-out
// =============================================================================

impl SessionManager {
    /// Authorization URL bound to a fresh PKCE verifier
    ///
    /// The verifier, `state` and return path are sealed into the short-lived
    /// verifier cookie included in the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot build the URL or sealing fails
    pub fn sign_in_url(
        &self,
        options: &SignInOptions,
        target_url: Option<&str>,
    ) -> Result<SignInRedirect, SessionError> {
        let return_pathname = options
            .return_pathname
            .as_deref()
            .and_then(sanitize_return_pathname);
        let pkce = PkceState::generate(return_pathname.as_deref());

        let url = self.provider.get_authorization_url(&AuthorizationUrlOptions {
            organization_id: options.organization_id.clone(),
            screen_hint: options.screen_hint,
            login_hint: options.login_hint.clone(),
            domain_hint: None,
            state: Some(pkce.state.clone()),
            code_challenge: Some(pkce.code_challenge()),
            redirect_uri: options.redirect_uri.clone(),
        })?;

        let sealed = self
            .codec
            .seal_value(&pkce)
            .map_err(|e| SessionError::Seal(e.to_string()))?;
        let cookie = CookieWrite::set(PKCE_COOKIE_NAME, &sealed, &self.pkce_attributes(target_url));

        Ok(SignInRedirect {
            url,
            cookies: vec![cookie],
        })
    }

    /// Deletion of the PKCE verifier cookie
    #[must_use]
    pub fn clear_pkce_cookie(&self, target_url: Option<&str>) -> CookieWrite {
        CookieWrite::delete(PKCE_COOKIE_NAME, &self.pkce_attributes(target_url))
    }

    /// Complete the authorization code flow
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` when the verifier cookie is missing,
    ///   unreadable or its `state` does not match
    /// - `SessionError::Provider` when the code exchange fails
    pub async fn handle_callback(
        &self,
        code: &str,
        state: Option<&str>,
        cookies: &HashMap<String, String>,
        target_url: Option<&str>,
    ) -> Result<CallbackOutcome, SessionError> {
        let pkce: PkceState = cookies
            .get(PKCE_COOKIE_NAME)
            .and_then(|sealed| self.codec.unseal_value(sealed))
            .ok_or_else(|| SessionError::InvalidState("missing or unreadable verifier".into()))?;

        if !state.is_some_and(|s| pkce.matches_state(s)) {
            warn!("Callback state does not match the verifier cookie");
            return Err(SessionError::InvalidState("state mismatch".into()));
        }

        let response = self
            .provider
            .authenticate_with_code(code, Some(&pkce.code_verifier))
            .await?;
        let organization_id = response.organization_id.clone();
        let authentication_method = response.authentication_method.clone();

        let (session, mut writes) = self.persist(Session::from(response), cookies, target_url)?;
        writes.push(self.clear_pkce_cookie(target_url));
        info!("Signed in user {}", session.session.user.id);

        Ok(CallbackOutcome {
            session: Box::new(session),
            cookies: writes,
            return_pathname: pkce.return_pathname.unwrap_or_else(|| "/".to_string()),
            organization_id,
            authentication_method,
        })
    }

    /// Delete the session and work out where to send the browser
    ///
    /// With a session carrying a session id, the provider logout URL (with
    /// `return_to`); otherwise `return_to` itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot build the logout URL
    pub fn sign_out(
        &self,
        cookies: &HashMap<String, String>,
        return_to: Option<&str>,
        target_url: Option<&str>,
    ) -> Result<SignOutOutcome, SessionError> {
        let writes = self.clear_session(cookies, target_url);

        let session_id = self.read_session(cookies).and_then(|session| {
            decode_claims(Some(&session.access_token))
                .map_err(|e| warn!("Signing out a session with unreadable claims: {e}"))
                .ok()
                .and_then(|claims| claims.sid)
        });

        let redirect_url = match session_id {
            Some(sid) => Some(self.provider.get_logout_url(&sid, return_to)?),
            None => return_to.map(ToString::to_string),
        };

        info!("Signed out, clearing {} session cookies", writes.len());
        Ok(SignOutOutcome {
            redirect_url,
            cookies: writes,
        })
    }
}

// =============================================================================
// Request Authentication
// =============================================================================

impl SessionManager {
    /// Middleware flow for one request
    ///
    /// - strips client-supplied internal headers
    /// - reads the session and refreshes it when the access token expired
    /// - forwards the sealed session, URL and redirect URI as internal headers
    /// - redirects to sign-in when `auth_required` and no session exists
    ///
    /// A failed refresh clears the session and continues without one; a
    /// step-up requirement becomes a redirect.
    ///
    /// # Errors
    ///
    /// Returns an error if claims cannot be decoded or sealing fails
    pub async fn authenticate_request(
        &self,
        ctx: &RequestContext,
        cookies: &HashMap<String, String>,
        options: &MiddlewareOptions,
    ) -> Result<AuthenticatedRequest, SessionError> {
        let trace = |message: &str| {
            if options.debug {
                info!("[{}] {message}", ctx.path());
            } else {
                debug!("[{}] {message}", ctx.path());
            }
        };

        let mut request_headers = ctx.headers.clone();
        strip_internal_headers(&mut request_headers);

        let redirect_uri = options
            .redirect_uri
            .clone()
            .unwrap_or_else(|| self.redirect_uri.clone());
        set_internal_header(&mut request_headers, URL_HEADER, ctx.url.as_str());
        set_internal_header(&mut request_headers, REDIRECT_URI_HEADER, &redirect_uri);

        let target_url = Some(ctx.url.as_str());
        let mut response_headers = HeaderMap::new();
        let mut redirect = None;
        let mut state = self.load(cookies)?;

        let expired = match &state {
            SessionState::Authenticated(current)
                if self.auto_refresh && current.claims.is_expired(self.refresh_leeway_seconds) =>
            {
                Some((current.session.clone(), current.claims.org_id.clone()))
            }
            _ => None,
        };

        if let Some((session, organization_id)) = expired {
            trace("Access token expired, refreshing session");
            match self
                .refresh_with(&session, organization_id.as_deref(), cookies, target_url)
                .await
            {
                Ok(RefreshOutcome::Refreshed {
                    session: refreshed,
                    cookies: writes,
                }) => {
                    response_headers = cookie_headers(&writes);
                    state = SessionState::Authenticated(refreshed);
                }
                Ok(RefreshOutcome::StepUpRequired {
                    authorization_url,
                    cookies: writes,
                    ..
                }) => {
                    trace("Step-up required, redirecting to authorization");
                    response_headers = cookie_headers(&writes);
                    redirect = trusted_redirect(ctx, &authorization_url, &response_headers, None);
                    state = SessionState::NoSession;
                }
                Err(e) => {
                    warn!("Clearing session after failed refresh: {e}");
                    response_headers = cookie_headers(&self.clear_session(cookies, target_url));
                    state = SessionState::NoSession;
                }
            }
        }

        match &state {
            SessionState::Authenticated(current) => {
                trace("Authenticated request");
                set_internal_header(&mut request_headers, SESSION_HEADER, &current.sealed);
            }
            SessionState::NoSession
                if redirect.is_none() && self.requires_sign_in(ctx, options, &redirect_uri) =>
            {
                trace("Unauthenticated request to protected path, redirecting to sign-in");
                let sign_in = self.sign_in_url(
                    &SignInOptions {
                        screen_hint: options
                            .is_sign_up_path(ctx.path())
                            .then_some(ScreenHint::SignUp),
                        return_pathname: Some(ctx.path_and_query()),
                        redirect_uri: options.redirect_uri.clone(),
                        ..SignInOptions::default()
                    },
                    target_url,
                )?;
                for (name, value) in &cookie_headers(&sign_in.cookies) {
                    response_headers.append(name.clone(), value.clone());
                }
                redirect = trusted_redirect(ctx, &sign_in.url, &response_headers, None);
            }
            SessionState::NoSession => trace("Unauthenticated request"),
        }

        Ok(AuthenticatedRequest {
            state,
            request_headers,
            response_headers,
            redirect,
        })
    }

    /// Middleware flow with options resolved once for this request
    ///
    /// # Errors
    ///
    /// Same as [`SessionManager::authenticate_request`]
    pub async fn authenticate_request_with(
        &self,
        ctx: &RequestContext,
        cookies: &HashMap<String, String>,
        options: &OptionsSource<MiddlewareOptions>,
    ) -> Result<AuthenticatedRequest, SessionError> {
        let options = options.resolve(ctx);
        self.authenticate_request(ctx, cookies, &options).await
    }

    fn requires_sign_in(
        &self,
        ctx: &RequestContext,
        options: &MiddlewareOptions,
        redirect_uri: &str,
    ) -> bool {
        if !options.auth_required || options.is_unauthenticated_path(ctx.path()) {
            return false;
        }
        // The callback route itself must stay reachable
        let callback_path = url::Url::parse(redirect_uri).ok();
        !callback_path.is_some_and(|url| url.path() == ctx.path())
    }
}
