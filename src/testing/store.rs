//! In-memory cookie jar that behaves like a browser for deletions
//!
//! Cookies are keyed by name, domain and path. A deletion only removes a
//! cookie when name, domain, path and sameSite all match the stored entry;
//! anything else is silently ignored, exactly as a browser would.

use std::collections::HashMap;

use crate::session::cookie::CookieAttributes;
use crate::session::store::CookieStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CookieKey {
    name: String,
    domain: Option<String>,
    path: String,
}

#[derive(Debug, Clone)]
struct StoredCookie {
    value: String,
    attributes: CookieAttributes,
}

#[derive(Debug, Default)]
pub struct MemoryCookieStore {
    cookies: HashMap<CookieKey, StoredCookie>,
    ignored_deletions: usize,
}

impl MemoryCookieStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a cookie as if the browser already held it
    pub fn insert(&mut self, name: &str, value: &str, attributes: &CookieAttributes) {
        self.set(name, value, attributes);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Attributes a cookie was stored with
    #[must_use]
    pub fn attributes(&self, name: &str) -> Option<&CookieAttributes> {
        self.cookies
            .iter()
            .find(|(key, _)| key.name == name)
            .map(|(_, stored)| &stored.attributes)
    }

    /// Deletions that matched nothing because of differing attributes
    #[must_use]
    pub const fn ignored_deletions(&self) -> usize {
        self.ignored_deletions
    }
}

impl CookieStore for MemoryCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies
            .iter()
            .find(|(key, _)| key.name == name)
            .map(|(_, stored)| stored.value.clone())
    }

    fn set(&mut self, name: &str, value: &str, attributes: &CookieAttributes) {
        let key = CookieKey {
            name: name.to_string(),
            domain: attributes.domain.clone(),
            path: attributes.path.clone(),
        };
        if attributes.max_age <= 0 {
            self.cookies.remove(&key);
            return;
        }
        self.cookies.insert(
            key,
            StoredCookie {
                value: value.to_string(),
                attributes: attributes.clone(),
            },
        );
    }

    fn delete(&mut self, name: &str, attributes: &CookieAttributes) {
        let key = CookieKey {
            name: name.to_string(),
            domain: attributes.domain.clone(),
            path: attributes.path.clone(),
        };
        match self.cookies.get(&key) {
            Some(stored) if stored.attributes.same_site == attributes.same_site => {
                self.cookies.remove(&key);
            }
            _ => self.ignored_deletions += 1,
        }
    }

    fn get_all(&self) -> HashMap<String, String> {
        self.cookies
            .iter()
            .map(|(key, stored)| (key.name.clone(), stored.value.clone()))
            .collect()
    }
}
