use std::collections::HashMap;

use crate::session::cookie::CookieAttributes;

/// Named-value cookie storage the session layer reads from and writes to
///
/// Implemented over an inbound request plus outbound response (see
/// `handlers::RequestCookieStore`) and, for tests, by an in-memory store.
pub trait CookieStore {
    fn get(&self, name: &str) -> Option<String>;

    fn set(&mut self, name: &str, value: &str, attributes: &CookieAttributes);

    /// Remove a cookie; attributes must match those it was set with
    fn delete(&mut self, name: &str, attributes: &CookieAttributes);

    fn get_all(&self) -> HashMap<String, String>;
}
