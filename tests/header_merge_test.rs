// Response header filtering and redirect construction
use actix_web::http::header::{
    HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, LOCATION, SET_COOKIE,
};
use actix_web::http::{Method, StatusCode};

use authkit_session::utils::header_processor::{
    merge_headers, strip_internal_headers, SESSION_HEADER,
};
use authkit_session::utils::redirect::{build_redirect, RedirectOptions};
use authkit_session::RequestContext;

fn header(name: &'static str, value: &'static str) -> (HeaderName, HeaderValue) {
    (HeaderName::from_static(name), HeaderValue::from_static(value))
}

fn ctx(method: Method, url: &str) -> RequestContext {
    RequestContext::new(method, url::Url::parse(url).unwrap(), HeaderMap::new())
}

#[test]
fn test_merge_drops_internal_and_keeps_cookies() {
    let mut session = HeaderMap::new();
    let (name, value) = header("set-cookie", "authkit-session=abc; Path=/");
    session.append(name, value);
    let (name, value) = header("x-authkit-session", "sealed");
    session.append(name, value);

    let mut app = HeaderMap::new();
    let (name, value) = header("set-cookie", "theme=dark; Path=/");
    app.append(name, value);
    let (name, value) = header("x-internal-session", "bogus");
    app.append(name, value);
    let (name, value) = header("vary", "cookie");
    app.append(name, value);

    let merged = merge_headers(&session, &app);

    let cookies: Vec<_> = merged.get_all(SET_COOKIE).collect();
    assert_eq!(cookies.len(), 2);
    assert!(merged.get("x-internal-session").is_none());
    assert!(merged.get(SESSION_HEADER).is_none());
    assert_eq!(merged.get("vary").unwrap(), "cookie");
    assert_eq!(merged.get(CACHE_CONTROL).unwrap(), "no-store");
}

#[test]
fn test_inbound_spoofed_headers_are_stripped() {
    let mut inbound = HeaderMap::new();
    let (name, value) = header("x-authkit-session", "forged");
    inbound.insert(name, value);
    let (name, value) = header("accept", "text/html");
    inbound.insert(name, value);

    assert_eq!(strip_internal_headers(&mut inbound), 1);
    assert!(inbound.get(SESSION_HEADER).is_none());
    assert!(inbound.get("accept").is_some());
}

#[test]
fn test_redirect_status_follows_method() {
    let get = build_redirect(
        &ctx(Method::GET, "https://app.example.com/a"),
        "/b",
        &HeaderMap::new(),
        &RedirectOptions::default(),
    )
    .unwrap();
    assert_eq!(get.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(get.headers.get(LOCATION).unwrap(), "https://app.example.com/b");

    let post = build_redirect(
        &ctx(Method::POST, "https://app.example.com/a"),
        "/b",
        &HeaderMap::new(),
        &RedirectOptions::default(),
    )
    .unwrap();
    assert_eq!(post.status, StatusCode::SEE_OTHER);
}

#[test]
fn test_redirect_refusals() {
    let request = ctx(Method::GET, "https://app.example.com/a");
    let headers = HeaderMap::new();

    assert!(build_redirect(&request, "/a#top", &headers, &RedirectOptions::default()).is_none());
    assert!(build_redirect(
        &request,
        "https://evil.example.net/",
        &headers,
        &RedirectOptions::default()
    )
    .is_none());

    let allowed = RedirectOptions::default().allow_origin("https://auth.example.com");
    let target = "https://auth.example.com/login";
    assert!(build_redirect(&request, target, &headers, &allowed).is_some());

    let mut preflight = ctx(Method::OPTIONS, "https://app.example.com/a");
    let (name, value) = header("access-control-request-method", "POST");
    preflight.headers.insert(name, value);
    assert!(build_redirect(&preflight, "/b", &headers, &RedirectOptions::default()).is_none());
}

#[test]
fn test_redirect_keeps_only_allowed_caller_headers() {
    let mut headers = HeaderMap::new();
    let (name, value) = header("set-cookie", "a=1");
    headers.append(name, value);
    let (name, value) = header("x-powered-by", "app");
    headers.append(name, value);
    let (name, value) = header("location", "https://ignored.example.com/");
    headers.append(name, value);

    let redirect = build_redirect(
        &ctx(Method::GET, "https://app.example.com/a"),
        "/b",
        &headers,
        &RedirectOptions::default(),
    )
    .unwrap();
    assert!(redirect.headers.get("x-powered-by").is_none());
    assert!(redirect.headers.get(SET_COOKIE).is_some());
    assert_eq!(redirect.headers.get_all(LOCATION).count(), 1);
    assert_eq!(redirect.location, "https://app.example.com/b");
}
