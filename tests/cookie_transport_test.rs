// Cookie chunking and attribute behaviour as seen by a browser
use std::collections::HashMap;
use std::sync::Arc;

use authkit_session::session::chunker::{chunk_value, read_value, CHUNK_SIZE};
use authkit_session::session::cookie::{apply_writes, compute_cookie_attributes, CookieConfig};
use authkit_session::session::CookieStore;
use authkit_session::testing::{
    MemoryCookieStore, MockAuthProvider, TestFixtures, TestSessionBuilder,
};

fn cookies(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn test_growth_from_direct_to_chunked() {
    let value = "x".repeat(5000);
    let writes = chunk_value("s", &value, &cookies(&[("s", "small")]));

    let names: Vec<&str> = writes.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, ["s.0", "s.1"]);
    assert!(writes.iter().all(|w| !w.clear));
    assert_eq!(writes[0].value.len(), CHUNK_SIZE);

    // Chunks take precedence over the stale direct cookie
    let mut jar = cookies(&[("s", "small")]);
    for w in &writes {
        jar.insert(w.name.clone(), w.value.clone());
    }
    assert_eq!(read_value("s", &jar), Some(value));
}

#[test]
fn test_shrink_clears_surplus_chunks() {
    let existing = cookies(&[("s.0", "a"), ("s.1", "b"), ("s.2", "c")]);

    let writes = chunk_value("s", &"y".repeat(CHUNK_SIZE + 1), &existing);
    let cleared: Vec<&str> = writes
        .iter()
        .filter(|w| w.clear)
        .map(|w| w.name.as_str())
        .collect();
    assert_eq!(cleared, ["s.2"]);

    let writes = chunk_value("s", "tiny", &existing);
    assert_eq!(writes[0].name, "s");
    assert_eq!(writes.iter().filter(|w| w.clear).count(), 3);
}

#[test]
fn test_read_ignores_lookalike_keys() {
    let jar = cookies(&[("s", "direct"), ("s.foo", "x"), ("s-backup", "y")]);
    assert_eq!(read_value("s", &jar).as_deref(), Some("direct"));
    assert_eq!(read_value("missing", &jar), None);
}

#[test]
fn test_large_session_round_trips_through_browser() {
    let provider = Arc::new(MockAuthProvider::new());
    let manager = TestFixtures::session_manager(provider);
    let mut browser = MemoryCookieStore::new();

    let large = TestSessionBuilder::new().with_claim_padding(8000).build();
    let writes = manager.write_session(&large, &browser.get_all(), None).unwrap();
    apply_writes(&writes, &mut browser);
    assert!(browser.len() >= 2);
    assert_eq!(manager.read_session(&browser.get_all()), Some(large));

    // Shrinking back to one cookie leaves nothing stale behind
    let small = TestSessionBuilder::new().build();
    let writes = manager.write_session(&small, &browser.get_all(), None).unwrap();
    apply_writes(&writes, &mut browser);
    assert_eq!(manager.read_session(&browser.get_all()), Some(small));
    assert!(browser
        .get_all()
        .keys()
        .all(|name| !name.starts_with("authkit-session.")));
}

#[test]
fn test_sign_out_with_domain_scoped_cookie() {
    let provider = Arc::new(MockAuthProvider::new());
    let scoped = TestFixtures::session_manager_with_config(
        provider.clone(),
        TestFixtures::cookie_config().with_domain("example.com"),
    );
    let host_only = TestFixtures::session_manager(provider);

    let mut browser = MemoryCookieStore::new();
    let session = TestSessionBuilder::new().with_claim_padding(5000).build();
    let writes = scoped.write_session(&session, &browser.get_all(), None).unwrap();
    apply_writes(&writes, &mut browser);
    let stored = browser.len();

    // Deleting without the domain attribute leaves the cookies in place
    let outcome = host_only.sign_out(&browser.get_all(), None, None).unwrap();
    apply_writes(&outcome.cookies, &mut browser);
    assert_eq!(browser.len(), stored);
    assert!(browser.ignored_deletions() > 0);

    let outcome = scoped.sign_out(&browser.get_all(), None, None).unwrap();
    assert!(outcome
        .cookies
        .iter()
        .all(|c| c.attributes.domain.as_deref() == Some("example.com")));
    apply_writes(&outcome.cookies, &mut browser);
    assert!(browser.is_empty());
}

#[test]
fn test_same_site_none_is_always_secure() {
    let config = CookieConfig::default().with_same_site("none").unwrap();
    let attributes = compute_cookie_attributes(Some("http://localhost:3000"), &config, false);
    assert!(attributes.secure);
    assert!(attributes.to_header_fragment().ends_with("Secure"));

    let lax = compute_cookie_attributes(
        Some("http://localhost:3000"),
        &CookieConfig::default(),
        false,
    );
    assert!(!lax.secure);
}
