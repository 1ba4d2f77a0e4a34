use std::collections::HashMap;

use actix_web::cookie::Cookie;
use actix_web::http::header::{HeaderValue, CACHE_CONTROL};
use actix_web::{HttpRequest, HttpResponseBuilder};
use log::debug;

use crate::session::cookie::CookieAttributes;
use crate::session::store::CookieStore;

/// Cookie store over an inbound actix request and its pending response cookies
#[derive(Debug, Default)]
pub struct RequestCookieStore {
    cookies: HashMap<String, String>,
    pending: Vec<Cookie<'static>>,
}

impl RequestCookieStore {
    #[must_use]
    pub fn from_request(req: &HttpRequest) -> Self {
        let cookies = match req.cookies() {
            Ok(cookies) => cookies
                .iter()
                .map(|c| (c.name().to_string(), c.value().to_string()))
                .collect(),
            Err(e) => {
                debug!("Ignoring unparseable cookie header: {e}");
                HashMap::new()
            }
        };

        Self {
            cookies,
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn pending(&self) -> &[Cookie<'static>] {
        &self.pending
    }

    /// Add pending cookies to a response; any cookie forces `no-store`
    pub fn apply_to(&self, builder: &mut HttpResponseBuilder) {
        if self.pending.is_empty() {
            return;
        }
        for cookie in &self.pending {
            builder.cookie(cookie.clone());
        }
        builder.insert_header((CACHE_CONTROL, HeaderValue::from_static("no-store")));
    }
}

impl CookieStore for RequestCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: &str, attributes: &CookieAttributes) {
        self.cookies.insert(name.to_string(), value.to_string());
        self.pending.push(attributes.build_cookie(name, value));
    }

    fn delete(&mut self, name: &str, attributes: &CookieAttributes) {
        self.cookies.remove(name);
        self.pending.push(attributes.expired().build_cookie(name, ""));
    }

    fn get_all(&self) -> HashMap<String, String> {
        self.cookies.clone()
    }
}
