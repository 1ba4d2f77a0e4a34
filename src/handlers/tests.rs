// Tests for the session handlers
use std::sync::Arc;

use actix_web::cookie::Cookie;
use actix_web::http::header::{CACHE_CONTROL, LOCATION};
use actix_web::http::StatusCode;
use actix_web::test::TestRequest;
use actix_web::{web, ResponseError};

use crate::handlers::auth::{RefreshQuery, SignInQuery, SignOutQuery};
use crate::handlers::callback::CallbackQuery;
use crate::handlers::{callback, refresh, session_info, sign_in, sign_out};
use crate::provider::ProviderError;
use crate::session::cookie::{apply_writes, PKCE_COOKIE_NAME};
use crate::session::store::CookieStore;
use crate::session::SessionError;
use crate::testing::builders::TestSessionBuilder;
use crate::testing::fixtures::TestFixtures;
use crate::testing::mock::MockAuthProvider;
use crate::testing::store::MemoryCookieStore;

const HOST: &str = "app.example.com";

fn data(provider: &Arc<MockAuthProvider>) -> web::Data<crate::session::SessionManager> {
    web::Data::new(TestFixtures::session_manager(provider.clone()))
}

fn location(response: &actix_web::HttpResponse) -> String {
    response
        .headers()
        .get(LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_sign_in_then_callback() {
    let provider = Arc::new(MockAuthProvider::new());
    let manager = data(&provider);

    let req = TestRequest::get()
        .uri("/sign-in")
        .insert_header(("host", HOST))
        .to_http_request();
    let query = web::Query::<SignInQuery>::from_query("return_pathname=/settings").unwrap();
    let response = sign_in(req, query, manager.clone()).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers().get(CACHE_CONTROL).unwrap(), "no-store");
    let verifier = response
        .cookies()
        .find(|c| c.name() == PKCE_COOKIE_NAME)
        .unwrap()
        .into_owned();
    let state = url::Url::parse(&location(&response))
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let req = TestRequest::get()
        .uri("/callback")
        .insert_header(("host", HOST))
        .cookie(Cookie::new(PKCE_COOKIE_NAME, verifier.value().to_string()))
        .to_http_request();
    let query =
        web::Query::<CallbackQuery>::from_query(&format!("code=code_1&state={state}")).unwrap();
    let response = callback(req, query, manager).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/settings");
    let names: Vec<String> = response.cookies().map(|c| c.name().to_string()).collect();
    assert!(names.contains(&"authkit-session".to_string()));
    assert!(names.contains(&PKCE_COOKIE_NAME.to_string()));
}

#[tokio::test]
async fn test_callback_with_provider_error() {
    let provider = Arc::new(MockAuthProvider::new());
    let req = TestRequest::get().uri("/callback").to_http_request();
    let query = web::Query::<CallbackQuery>::from_query(
        "error=access_denied&error_description=User%20cancelled",
    )
    .unwrap();

    let err = callback(req, query, data(&provider)).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(_)));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sign_out_clears_cookies() {
    let provider = Arc::new(MockAuthProvider::new());
    let manager = data(&provider);
    let mut store = MemoryCookieStore::new();
    let writes = manager
        .write_session(&TestSessionBuilder::new().build(), &store.get_all(), None)
        .unwrap();
    apply_writes(&writes, &mut store);

    let mut req = TestRequest::get().uri("/sign-out").insert_header(("host", HOST));
    for (name, value) in store.get_all() {
        req = req.cookie(Cookie::new(name, value));
    }
    let query = web::Query::<SignOutQuery>::from_query("return_to=%2Fgoodbye").unwrap();
    let response = sign_out(req.to_http_request(), query, manager).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location(&response);
    assert!(location.contains("/user_management/sessions/logout"));
    assert!(location.contains("return_to=http%3A%2F%2Fapp.example.com%2Fgoodbye"));
    assert!(response
        .cookies()
        .all(|c| c.max_age().is_some_and(|age| age.is_zero())));
}

#[tokio::test]
async fn test_sign_out_ignores_cross_origin_return_to() {
    let provider = Arc::new(MockAuthProvider::new());
    let req = TestRequest::get()
        .uri("/sign-out")
        .insert_header(("host", HOST))
        .to_http_request();
    let query = web::Query::<SignOutQuery>::from_query(
        "return_to=https%3A%2F%2Fevil.example.net%2Fphish",
    )
    .unwrap();

    let response = sign_out(req, query, data(&provider)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_sign_out_keeps_same_origin_return_to() {
    let provider = Arc::new(MockAuthProvider::new());
    let req = TestRequest::get()
        .uri("/sign-out")
        .insert_header(("host", HOST))
        .to_http_request();
    let query = web::Query::<SignOutQuery>::from_query("return_to=%2Fgoodbye").unwrap();

    let response = sign_out(req, query, data(&provider)).await.unwrap();
    assert_eq!(location(&response), "http://app.example.com/goodbye");
}

#[tokio::test]
async fn test_refresh_reports_step_up() {
    let provider = Arc::new(MockAuthProvider::new());
    provider.push_refresh(Err(ProviderError::api(400, "sso_required")));
    let manager = data(&provider);
    let mut store = MemoryCookieStore::new();
    let writes = manager
        .write_session(
            &TestSessionBuilder::new().with_organization("org_5").build(),
            &store.get_all(),
            None,
        )
        .unwrap();
    apply_writes(&writes, &mut store);

    let mut req = TestRequest::post().uri("/refresh").insert_header(("host", HOST));
    for (name, value) in store.get_all() {
        req = req.cookie(Cookie::new(name, value));
    }
    let query = web::Query::<RefreshQuery>::from_query("").unwrap();
    let response = refresh(req.to_http_request(), query, manager).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.cookies().any(|c| c.name() == PKCE_COOKIE_NAME));
}

#[tokio::test]
async fn test_session_info_without_session() {
    let provider = Arc::new(MockAuthProvider::new());
    let req = TestRequest::get().uri("/session").to_http_request();
    let err = session_info(req, data(&provider)).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
}
