// Authorization code callback handler
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use log::{error, info};
use serde::Deserialize;

use crate::handlers::cookies::RequestCookieStore;
use crate::handlers::helpers::{redirect_with_cookies, target_url};
use crate::session::cookie::apply_writes;
use crate::session::store::CookieStore;
use crate::session::{SessionError, SessionManager};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Exchange the authorization code, set the session cookies and return the
/// browser to where sign-in started
///
/// # Errors
/// - `SessionError::InvalidState` for provider-reported errors, a missing code
///   or a state that does not match the verifier cookie
/// - `SessionError::Provider` when the code exchange fails
pub async fn callback(
    req: HttpRequest,
    query: web::Query<CallbackQuery>,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse, SessionError> {
    if let Some(error) = &query.error {
        error!(
            "Authorization failed: {error} {}",
            query.error_description.as_deref().unwrap_or_default()
        );
        return Err(SessionError::InvalidState(format!(
            "authorization failed: {error}"
        )));
    }

    let code = query
        .code
        .as_deref()
        .ok_or_else(|| SessionError::InvalidState("missing authorization code".into()))?;

    let target = target_url(&req);
    let mut store = RequestCookieStore::from_request(&req);

    let outcome = session_manager
        .handle_callback(
            code,
            query.state.as_deref(),
            &store.get_all(),
            target.as_deref(),
        )
        .await?;
    apply_writes(&outcome.cookies, &mut store);

    info!(
        "Callback complete for user {}, returning to {}",
        outcome.session.user().id,
        outcome.return_pathname
    );
    Ok(redirect_with_cookies(
        StatusCode::TEMPORARY_REDIRECT,
        &outcome.return_pathname,
        &store,
    ))
}
