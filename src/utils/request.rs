//! Framework-agnostic view of an inbound request and per-request options

use actix_web::http::header::HeaderMap;
use actix_web::http::Method;
use actix_web::HttpRequest;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// The parts of a request the session layer looks at
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl RequestContext {
    #[must_use]
    pub fn new(method: Method, url: Url, headers: HeaderMap) -> Self {
        Self {
            method,
            url,
            headers,
        }
    }

    /// Reconstruct the absolute request URL from an actix request
    ///
    /// Returns `None` when scheme and host do not form a valid URL.
    #[must_use]
    pub fn from_http_request(req: &HttpRequest) -> Option<Self> {
        let info = req.connection_info();
        let path = req
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        let url = Url::parse(&format!("{}://{}{}", info.scheme(), info.host(), path)).ok()?;

        Some(Self {
            method: req.method().clone(),
            url,
            headers: req.headers().clone(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Path plus query, as used for return destinations
    #[must_use]
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{query}", self.url.path()),
            None => self.url.path().to_string(),
        }
    }

    /// A CORS preflight: `OPTIONS` carrying `Access-Control-Request-Method`
    #[must_use]
    pub fn is_preflight(&self) -> bool {
        self.method == Method::OPTIONS && self.headers.contains_key("access-control-request-method")
    }
}

/// An option that is either fixed or computed from the request
pub enum OptionsSource<T> {
    Static(T),
    Dynamic(Arc<dyn Fn(&RequestContext) -> T + Send + Sync>),
}

impl<T: Clone> OptionsSource<T> {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> T + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    /// Resolve once for the current request
    pub fn resolve(&self, ctx: &RequestContext) -> T {
        match self {
            Self::Static(value) => value.clone(),
            Self::Dynamic(f) => f(ctx),
        }
    }
}

impl<T: Clone> Clone for OptionsSource<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(value) => Self::Static(value.clone()),
            Self::Dynamic(f) => Self::Dynamic(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for OptionsSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl<T: Default> Default for OptionsSource<T> {
    fn default() -> Self {
        Self::Static(T::default())
    }
}

/// Behaviour of `SessionManager::authenticate_request`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiddlewareOptions {
    /// Log per-request traces at info level
    pub debug: bool,
    /// Overrides the configured redirect URI for this request
    pub redirect_uri: Option<String>,
    /// Redirect unauthenticated requests to sign-in
    pub auth_required: bool,
    /// Paths reachable without a session when `auth_required` is set
    pub unauthenticated_paths: Vec<String>,
    /// Paths whose sign-in redirect opens the sign-up screen
    pub sign_up_paths: Vec<String>,
}

impl MiddlewareOptions {
    #[must_use]
    pub fn is_unauthenticated_path(&self, path: &str) -> bool {
        self.unauthenticated_paths
            .iter()
            .any(|pattern| path_matches(pattern, path))
    }

    #[must_use]
    pub fn is_sign_up_path(&self, path: &str) -> bool {
        self.sign_up_paths
            .iter()
            .any(|pattern| path_matches(pattern, path))
    }
}

/// Exact match, or prefix match for patterns ending in `/*`
fn path_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some(prefix) => {
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        }
        None => pattern == path,
    }
}
