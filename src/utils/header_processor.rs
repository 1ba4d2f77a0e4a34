//! Header Merge Layer
//!
//! Two namespaces never mix:
//! - internal `x-authkit-*` headers travel from the session layer to
//!   downstream request handlers only, and are stripped from anything a
//!   client sends
//! - response headers reaching the browser must be on a small allowlist

use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, SET_COOKIE};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::session::cookie::CookieWrite;

// ===============================
// HEADER NAMESPACES
// ===============================

/// Sealed session forwarded to downstream handlers
pub const SESSION_HEADER: &str = "x-authkit-session";
/// Absolute URL of the current request
pub const URL_HEADER: &str = "x-authkit-url";
/// Redirect URI in effect for the current request
pub const REDIRECT_URI_HEADER: &str = "x-authkit-redirect-uri";

/// Headers allowed to reach the browser
pub const RESPONSE_HEADER_ALLOWLIST: &[&str] = &[
    "set-cookie",
    "cache-control",
    "vary",
    "www-authenticate",
    "proxy-authenticate",
    "link",
];

static INTERNAL_HEADER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^x-authkit-").expect("valid internal header pattern"));

#[must_use]
pub fn is_internal_header(name: &str) -> bool {
    INTERNAL_HEADER_PATTERN.is_match(name)
}

/// Whether a header may be sent to the browser
#[must_use]
pub fn is_response_allowed(name: &str) -> bool {
    !is_internal_header(name)
        && RESPONSE_HEADER_ALLOWLIST
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(name))
}

// ===============================
// REQUEST SIDE
// ===============================

/// Remove internal headers a client tried to smuggle in
///
/// Returns the number of header names removed.
pub fn strip_internal_headers(headers: &mut HeaderMap) -> usize {
    let internal: Vec<HeaderName> = headers
        .keys()
        .filter(|name| is_internal_header(name.as_str()))
        .cloned()
        .collect();

    for name in &internal {
        warn!("Stripping client-supplied internal header {name}");
        headers.remove(name);
    }
    internal.len()
}

// ===============================
// RESPONSE SIDE
// ===============================

/// Keep only allowlisted headers
#[must_use]
pub fn filter_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    append_allowed(&mut filtered, headers);
    filtered
}

fn append_allowed(target: &mut HeaderMap, source: &HeaderMap) {
    for (name, value) in source {
        if is_response_allowed(name.as_str()) {
            target.append(name.clone(), value.clone());
        } else {
            debug!("Dropping response header {name}");
        }
    }
}

/// Force `cache-control: no-store` on responses setting cookies without a
/// cache directive of their own
pub fn ensure_no_store(headers: &mut HeaderMap) {
    if headers.contains_key(SET_COOKIE) && !headers.contains_key(CACHE_CONTROL) {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }
}

/// Merge session-layer headers with headers produced by application code
///
/// Both sides are filtered through the allowlist and appended, so repeated
/// headers such as `set-cookie` keep every value.
#[must_use]
pub fn merge_headers(session_headers: &HeaderMap, app_headers: &HeaderMap) -> HeaderMap {
    let mut merged = HeaderMap::new();
    append_allowed(&mut merged, session_headers);
    append_allowed(&mut merged, app_headers);
    ensure_no_store(&mut merged);
    merged
}

/// `set-cookie` headers for a cookie write list
#[must_use]
pub fn cookie_headers(writes: &[CookieWrite]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for write in writes {
        match HeaderValue::from_str(&write.to_header_value()) {
            Ok(value) => headers.append(SET_COOKIE, value),
            Err(e) => warn!("Skipping unrepresentable cookie {}: {e}", write.name),
        }
    }
    headers
}

/// Insert an internal request header; values that are not valid header text are skipped
pub fn set_internal_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(e) => warn!("Skipping internal header {name}: {e}"),
    }
}
