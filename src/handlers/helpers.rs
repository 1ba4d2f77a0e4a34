// Response helpers shared by the session handlers
use actix_web::http::header::{HeaderMap, LOCATION};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};
use log::warn;

use crate::handlers::cookies::RequestCookieStore;
use crate::utils::header_processor::{ensure_no_store, filter_response_headers};
use crate::utils::redirect::{build_redirect, Redirect, RedirectOptions};
use crate::utils::request::RequestContext;

/// Absolute URL of the request, used for the cookie `Secure` decision
#[must_use]
pub fn target_url(req: &HttpRequest) -> Option<String> {
    RequestContext::from_http_request(req).map(|ctx| ctx.url.to_string())
}

/// Resolve a caller-provided destination, keeping it only when same-origin
#[must_use]
pub fn same_origin_location(req: &HttpRequest, target: &str) -> Option<String> {
    let ctx = RequestContext::from_http_request(req)?;
    let redirect = build_redirect(&ctx, target, &HeaderMap::new(), &RedirectOptions::default());
    if redirect.is_none() {
        warn!("Ignoring unsafe redirect destination");
    }
    redirect.map(|redirect| redirect.location)
}

/// Redirect carrying the store's pending cookies
#[must_use]
pub fn redirect_with_cookies(
    status: StatusCode,
    location: &str,
    store: &RequestCookieStore,
) -> HttpResponse {
    let mut builder = HttpResponse::build(status);
    builder.insert_header((LOCATION, location));
    store.apply_to(&mut builder);
    builder.finish()
}

/// Turn a computed redirect into a response
#[must_use]
pub fn redirect_response(redirect: &Redirect) -> HttpResponse {
    let mut response = HttpResponse::new(redirect.status);
    let headers = response.headers_mut();
    for (name, value) in &redirect.headers {
        headers.append(name.clone(), value.clone());
    }
    ensure_no_store(headers);
    response
}

/// Attach session-layer headers to a response produced by application code
///
/// Only allowlisted headers are added, appended to what the response already
/// carries.
#[must_use]
pub fn attach_session_headers(
    mut response: HttpResponse,
    session_headers: &HeaderMap,
) -> HttpResponse {
    let headers = response.headers_mut();
    for (name, value) in &filter_response_headers(session_headers) {
        headers.append(name.clone(), value.clone());
    }
    ensure_no_store(headers);
    response
}
