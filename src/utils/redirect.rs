use actix_web::http::header::{HeaderMap, HeaderValue, LOCATION};
use actix_web::http::StatusCode;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::utils::header_processor::filter_response_headers;
use crate::utils::request::RequestContext;

// Path traversal, the most common attack on return paths
static PATH_TRAVERSAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.\.").expect("valid traversal pattern"));

// Scheme prefix or protocol-relative `//`, matched against the path only
static PROTOCOL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[a-z][a-z0-9+.-]*:|/{2,})").expect("valid protocol pattern")
});

// Control characters, backslashes and invisible formatting characters
static SUSPICIOUS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x1F\x7F-\x9F]|\\|[\u{200E}\u{200F}\u{2060}-\u{2064}\u{2000}-\u{200A}]")
        .expect("valid suspicious pattern")
});

const MAX_RETURN_PATH_LENGTH: usize = 2048;

/// Predicate deciding whether a cross-origin target is acceptable
pub type OriginPredicate = Arc<dyn Fn(&Url) -> bool + Send + Sync>;

/// Constraints on where `build_redirect` may send the browser
#[derive(Clone, Default)]
pub struct RedirectOptions {
    /// Overrides the method-derived status
    pub status: Option<StatusCode>,
    /// Exact origins (`https://host[:port]`) accepted for cross-origin targets
    pub allowed_origins: Vec<String>,
    pub allow: Option<OriginPredicate>,
}

impl fmt::Debug for RedirectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectOptions")
            .field("status", &self.status)
            .field("allowed_origins", &self.allowed_origins)
            .field("allow", &self.allow.as_ref().map(|_| ".."))
            .finish()
    }
}

impl RedirectOptions {
    #[must_use]
    pub fn allow_origin(mut self, origin: &str) -> Self {
        self.allowed_origins.push(origin.trim_end_matches('/').to_string());
        self
    }

    #[must_use]
    pub fn allow_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Url) -> bool + Send + Sync + 'static,
    {
        self.allow = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    fn permits(&self, target: &Url) -> bool {
        let origin = target.origin().ascii_serialization();
        self.allowed_origins.iter().any(|allowed| *allowed == origin)
            || self.allow.as_ref().is_some_and(|predicate| predicate(target))
    }
}

/// A redirect the caller should send
#[derive(Debug, Clone)]
pub struct Redirect {
    pub location: String,
    pub status: StatusCode,
    /// Allowlisted caller headers plus `location`
    pub headers: HeaderMap,
}

/// 307 keeps the method for safe requests; 303 turns unsafe ones into a GET
#[must_use]
pub fn redirect_status(ctx: &RequestContext) -> StatusCode {
    if ctx.method.is_safe() {
        StatusCode::TEMPORARY_REDIRECT
    } else {
        StatusCode::SEE_OTHER
    }
}

/// Redirect to a location the session layer computed itself
///
/// Caller-supplied headers are filtered and any `location` among them replaced.
/// Returns `None` for a preflight request.
#[must_use]
pub fn trusted_redirect(
    ctx: &RequestContext,
    location: &str,
    headers: &HeaderMap,
    status: Option<StatusCode>,
) -> Option<Redirect> {
    if ctx.is_preflight() {
        debug!("Not redirecting preflight request to {}", ctx.path());
        return None;
    }

    let value = match HeaderValue::from_str(location) {
        Ok(value) => value,
        Err(e) => {
            debug!("Not redirecting to unrepresentable location: {e}");
            return None;
        }
    };

    let mut redirect_headers = filter_response_headers(headers);
    redirect_headers.remove(LOCATION);
    redirect_headers.insert(LOCATION, value);

    Some(Redirect {
        location: location.to_string(),
        status: status.unwrap_or_else(|| redirect_status(ctx)),
        headers: redirect_headers,
    })
}

/// Build a redirect to a caller-provided target
///
/// The target is resolved against the request URL. The redirect is refused,
/// with a debug log, when it points at the current URL (fragment ignored), at
/// another origin that is not allowlisted, or when the request is a preflight.
#[must_use]
pub fn build_redirect(
    ctx: &RequestContext,
    target: &str,
    headers: &HeaderMap,
    options: &RedirectOptions,
) -> Option<Redirect> {
    let resolved = match ctx.url.join(target) {
        Ok(url) => url,
        Err(e) => {
            debug!("Not redirecting to unparseable target '{target}': {e}");
            return None;
        }
    };

    let mut current = ctx.url.clone();
    current.set_fragment(None);
    let mut comparable = resolved.clone();
    comparable.set_fragment(None);
    if comparable == current {
        debug!("Not redirecting to the current URL {current}");
        return None;
    }

    if resolved.origin() != ctx.url.origin() && !options.permits(&resolved) {
        debug!(
            "Not redirecting to cross-origin target {}",
            resolved.origin().ascii_serialization()
        );
        return None;
    }

    trusted_redirect(ctx, resolved.as_str(), headers, options.status)
}

/// Validate a post-authentication return path
///
/// Only same-site relative paths survive; encoded traversal, protocol
/// injection and control characters are rejected.
#[must_use]
pub fn sanitize_return_pathname(path: &str) -> Option<String> {
    if !path.starts_with('/') || path.len() > MAX_RETURN_PATH_LENGTH {
        return None;
    }

    for variant in decoded_variants(path) {
        if PATH_TRAVERSAL_PATTERN.is_match(&variant)
            || PROTOCOL_PATTERN.is_match(path_part(&variant))
            || SUSPICIOUS_PATTERN.is_match(&variant)
        {
            warn!("Rejecting suspicious return path ({} chars)", path.len());
            return None;
        }
    }

    Some(path.to_string())
}

/// Everything before the query or fragment
fn path_part(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// The path, plus its single and double URL-decoded forms when they differ
fn decoded_variants(path: &str) -> Vec<String> {
    let mut variants = vec![path.to_string()];
    let mut current = path.to_string();
    for _ in 0..2 {
        match urlencoding::decode(&current) {
            Ok(decoded) if decoded != current => {
                current = decoded.into_owned();
                variants.push(current.clone());
            }
            _ => break,
        }
    }
    variants
}
