// Session handlers: sign-in, sign-out, refresh, session info
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, info};
use serde::Deserialize;

use crate::handlers::cookies::RequestCookieStore;
use crate::handlers::helpers::{redirect_with_cookies, same_origin_location, target_url};
use crate::provider::ScreenHint;
use crate::session::cookie::apply_writes;
use crate::session::store::CookieStore;
use crate::session::{RefreshOutcome, SessionError, SessionManager, SessionState, SignInOptions};

#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    pub return_pathname: Option<String>,
    pub organization_id: Option<String>,
    pub login_hint: Option<String>,
    /// `sign-up` opens the sign-up screen
    pub screen_hint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignOutQuery {
    pub return_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    pub organization_id: Option<String>,
}

/// Redirect to the provider's authorization page with a fresh PKCE verifier
///
/// # Errors
/// Returns an error if the authorization URL cannot be built
pub async fn sign_in(
    req: HttpRequest,
    query: web::Query<SignInQuery>,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse, SessionError> {
    let target = target_url(&req);
    let screen_hint = match query.screen_hint.as_deref() {
        Some("sign-up") => Some(ScreenHint::SignUp),
        Some("sign-in") => Some(ScreenHint::SignIn),
        _ => None,
    };

    let sign_in = session_manager.sign_in_url(
        &SignInOptions {
            organization_id: query.organization_id.clone(),
            screen_hint,
            login_hint: query.login_hint.clone(),
            return_pathname: query.return_pathname.clone(),
            redirect_uri: None,
        },
        target.as_deref(),
    )?;

    let mut store = RequestCookieStore::from_request(&req);
    apply_writes(&sign_in.cookies, &mut store);
    debug!("Redirecting to authorization URL");
    Ok(redirect_with_cookies(
        StatusCode::TEMPORARY_REDIRECT,
        &sign_in.url,
        &store,
    ))
}

/// Clear the session and redirect to the provider logout or `return_to`
///
/// A `return_to` on another origin is dropped and `/` used instead.
///
/// # Errors
/// Returns an error if the logout URL cannot be built
pub async fn sign_out(
    req: HttpRequest,
    query: web::Query<SignOutQuery>,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse, SessionError> {
    let target = target_url(&req);
    let mut store = RequestCookieStore::from_request(&req);
    let return_to = query
        .return_to
        .as_deref()
        .and_then(|destination| same_origin_location(&req, destination));

    let outcome =
        session_manager.sign_out(&store.get_all(), return_to.as_deref(), target.as_deref())?;
    apply_writes(&outcome.cookies, &mut store);

    let location = outcome.redirect_url.unwrap_or_else(|| "/".to_string());
    Ok(redirect_with_cookies(StatusCode::SEE_OTHER, &location, &store))
}

/// Refresh the session, optionally into another organization
///
/// Responds with the refreshed user, or with the authorization URL when the
/// provider requires step-up authentication.
///
/// # Errors
/// Returns `SessionError::NoSession` without a session and provider errors
/// other than step-up
pub async fn refresh(
    req: HttpRequest,
    query: web::Query<RefreshQuery>,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse, SessionError> {
    let target = target_url(&req);
    let mut store = RequestCookieStore::from_request(&req);

    let outcome = session_manager
        .refresh_session(
            &store.get_all(),
            query.organization_id.as_deref(),
            target.as_deref(),
        )
        .await?;

    let mut builder = HttpResponse::Ok();
    let body = match outcome {
        RefreshOutcome::Refreshed { session, cookies } => {
            apply_writes(&cookies, &mut store);
            info!("Session refreshed via handler");
            serde_json::json!({
                "user": session.user(),
                "organization_id": session.organization_id(),
            })
        }
        RefreshOutcome::StepUpRequired {
            authorization_url,
            organization_id,
            cookies,
        } => {
            apply_writes(&cookies, &mut store);
            serde_json::json!({
                "step_up_required": true,
                "authorization_url": authorization_url,
                "organization_id": organization_id,
            })
        }
    };
    store.apply_to(&mut builder);
    Ok(builder.json(body))
}

/// Current user and claims, or 401 without a session
///
/// # Errors
/// Returns `SessionError::NoSession` without a session
pub async fn session_info(
    req: HttpRequest,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse, SessionError> {
    let store = RequestCookieStore::from_request(&req);
    match session_manager.load(&store.get_all())? {
        SessionState::Authenticated(session) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "user": session.user(),
            "session_id": session.session_id(),
            "organization_id": session.organization_id(),
            "role": session.role(),
            "roles": session.roles(),
            "permissions": session.permissions(),
            "entitlements": session.entitlements(),
            "feature_flags": session.feature_flags(),
            "impersonator": session.impersonator(),
        }))),
        SessionState::NoSession => Err(SessionError::NoSession),
    }
}
