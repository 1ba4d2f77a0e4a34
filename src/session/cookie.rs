use actix_web::cookie::{time::Duration, Cookie, SameSite};
use log::debug;

use crate::session::store::CookieStore;
use crate::settings::ConfigError;

/// Common cookie names used across the crate
pub const DEFAULT_COOKIE_NAME: &str = "authkit-session";
pub const PKCE_COOKIE_NAME: &str = "authkit-verifier";

/// 400 days, the longest Max-Age major browsers accept.
/// Session liveness is governed by the access token, not by the cookie.
pub const DEFAULT_MAX_AGE_SECONDS: i64 = 400 * 24 * 60 * 60;

/// Lifetime of the PKCE verifier cookie (sign-in round trip)
pub const PKCE_MAX_AGE_SECONDS: i64 = 10 * 60;

/// `SameSite` mode accepted in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSitePolicy {
    #[default]
    Lax,
    Strict,
    None,
}

impl SameSitePolicy {
    /// Parse a configured value; absent or empty means `Lax`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSameSite` naming the value when it is not
    /// one of `lax`, `strict`, `none` (case-insensitive)
    pub fn parse(value: Option<&str>) -> Result<Self, ConfigError> {
        let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(Self::Lax);
        };

        match raw.to_ascii_lowercase().as_str() {
            "lax" => Ok(Self::Lax),
            "strict" => Ok(Self::Strict),
            "none" => Ok(Self::None),
            _ => Err(ConfigError::InvalidSameSite(raw.to_string())),
        }
    }

    /// Capitalized form used in `Set-Cookie`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lax => "Lax",
            Self::Strict => "Strict",
            Self::None => "None",
        }
    }

    #[must_use]
    pub const fn to_cookie_same_site(self) -> SameSite {
        match self {
            Self::Lax => SameSite::Lax,
            Self::Strict => SameSite::Strict,
            Self::None => SameSite::None,
        }
    }
}

/// Cookie settings resolved from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieConfig {
    pub name: String,
    pub domain: Option<String>,
    pub same_site: SameSitePolicy,
    /// Raw Max-Age override; invalid values fall back to the default
    pub max_age: Option<String>,
    /// URL consulted for the `Secure` decision when the request URL is unknown
    pub fallback_url: Option<String>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            domain: None,
            same_site: SameSitePolicy::Lax,
            max_age: None,
            fallback_url: None,
        }
    }
}

impl CookieConfig {
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string()).filter(|d| !d.is_empty());
        self
    }

    /// # Errors
    ///
    /// Returns an error if `same_site` is not a recognized mode
    pub fn with_same_site(mut self, same_site: &str) -> Result<Self, ConfigError> {
        self.same_site = SameSitePolicy::parse(Some(same_site))?;
        Ok(self)
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: &str) -> Self {
        self.max_age = Some(max_age.to_string());
        self
    }

    #[must_use]
    pub fn with_fallback_url(mut self, url: &str) -> Self {
        self.fallback_url = Some(url.to_string());
        self
    }
}

/// Attributes attached to every cookie the crate writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAttributes {
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSitePolicy,
    pub max_age: i64,
    pub domain: Option<String>,
}

impl CookieAttributes {
    /// Same attributes with `Max-Age=0`, for deletion
    #[must_use]
    pub fn expired(&self) -> Self {
        Self {
            max_age: 0,
            ..self.clone()
        }
    }

    /// Same attributes with a different Max-Age
    #[must_use]
    pub fn with_max_age(&self, max_age: i64) -> Self {
        Self {
            max_age,
            ..self.clone()
        }
    }

    /// Render as a `Set-Cookie` attribute fragment
    ///
    /// `Path=/; HttpOnly; SameSite=Lax; Max-Age=34560000[; Domain=d][; Secure]`
    #[must_use]
    pub fn to_header_fragment(&self) -> String {
        let mut parts = vec![format!("Path={}", self.path)];
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        parts.push(format!("SameSite={}", self.same_site.as_str()));
        parts.push(format!("Max-Age={}", self.max_age));
        if let Some(domain) = &self.domain {
            parts.push(format!("Domain={domain}"));
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        parts.join("; ")
    }

    /// Build a structured cookie carrying these attributes
    #[must_use]
    pub fn build_cookie(&self, name: &str, value: &str) -> Cookie<'static> {
        let mut builder = Cookie::build(name.to_owned(), value.to_owned())
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site.to_cookie_same_site())
            .max_age(Duration::seconds(self.max_age));

        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }

        builder.finish()
    }
}

/// Compute cookie attributes for a target URL
///
/// - `SameSite=None` always forces `Secure`
/// - otherwise `Secure` follows the scheme of `target_url` (or the configured
///   fallback URL); a missing or unparseable URL yields `Secure`
/// - `expired` produces `Max-Age=0` for deletion
#[must_use]
pub fn compute_cookie_attributes(
    target_url: Option<&str>,
    config: &CookieConfig,
    expired: bool,
) -> CookieAttributes {
    let secure = if config.same_site == SameSitePolicy::None {
        true
    } else {
        target_url
            .or(config.fallback_url.as_deref())
            .and_then(|raw| url::Url::parse(raw).ok())
            .map_or(true, |parsed| parsed.scheme() == "https")
    };

    let max_age = if expired {
        0
    } else {
        resolve_max_age(config.max_age.as_deref())
    };

    CookieAttributes {
        path: "/".to_string(),
        http_only: true,
        secure,
        same_site: config.same_site,
        max_age,
        domain: config.domain.clone().filter(|d| !d.is_empty()),
    }
}

/// Render the attributes for a target URL directly as a header fragment
#[must_use]
pub fn cookie_attributes_header(
    target_url: Option<&str>,
    config: &CookieConfig,
    expired: bool,
) -> String {
    compute_cookie_attributes(target_url, config, expired).to_header_fragment()
}

fn resolve_max_age(raw: Option<&str>) -> i64 {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => match value.parse::<i64>() {
            Ok(seconds) if seconds > 0 => seconds,
            _ => {
                debug!("Ignoring invalid cookie max-age override '{value}'");
                DEFAULT_MAX_AGE_SECONDS
            }
        },
        None => DEFAULT_MAX_AGE_SECONDS,
    }
}

/// A single cookie mutation produced by the session layer
///
/// Deletions keep the exact name/domain/path/sameSite of the cookie they
/// remove; browsers ignore a deletion whose attributes differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieWrite {
    pub name: String,
    pub value: String,
    pub attributes: CookieAttributes,
}

impl CookieWrite {
    #[must_use]
    pub fn set(name: &str, value: &str, attributes: &CookieAttributes) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            attributes: attributes.clone(),
        }
    }

    #[must_use]
    pub fn delete(name: &str, attributes: &CookieAttributes) -> Self {
        Self {
            name: name.to_string(),
            value: String::new(),
            attributes: attributes.expired(),
        }
    }

    #[must_use]
    pub const fn is_deletion(&self) -> bool {
        self.attributes.max_age <= 0
    }

    #[must_use]
    pub fn to_cookie(&self) -> Cookie<'static> {
        self.attributes.build_cookie(&self.name, &self.value)
    }

    /// Full `Set-Cookie` header value
    #[must_use]
    pub fn to_header_value(&self) -> String {
        format!(
            "{}={}; {}",
            self.name,
            self.value,
            self.attributes.to_header_fragment()
        )
    }

    /// Apply this mutation to a cookie store
    pub fn apply_to(&self, store: &mut dyn CookieStore) {
        if self.is_deletion() {
            store.delete(&self.name, &self.attributes);
        } else {
            store.set(&self.name, &self.value, &self.attributes);
        }
    }
}

/// Apply a whole write list in order
pub fn apply_writes(writes: &[CookieWrite], store: &mut dyn CookieStore) {
    for write in writes {
        write.apply_to(store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_site_parse() {
        assert_eq!(SameSitePolicy::parse(None).unwrap(), SameSitePolicy::Lax);
        assert_eq!(SameSitePolicy::parse(Some("")).unwrap(), SameSitePolicy::Lax);
        assert_eq!(SameSitePolicy::parse(Some("LAX")).unwrap(), SameSitePolicy::Lax);
        assert_eq!(
            SameSitePolicy::parse(Some("Strict")).unwrap(),
            SameSitePolicy::Strict
        );
        assert_eq!(SameSitePolicy::parse(Some("none")).unwrap(), SameSitePolicy::None);

        let err = SameSitePolicy::parse(Some("relaxed")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSameSite(ref v) if v == "relaxed"));
    }

    #[test]
    fn test_same_site_none_forces_secure() {
        let config = CookieConfig::default().with_same_site("none").unwrap();
        for url in [
            Some("http://localhost:3000"),
            Some("https://example.com"),
            Some("not a url"),
            None,
        ] {
            let attrs = compute_cookie_attributes(url, &config, false);
            assert!(attrs.secure, "SameSite=None must be secure for {url:?}");
        }
    }

    #[test]
    fn test_secure_follows_scheme() {
        let config = CookieConfig::default();
        assert!(compute_cookie_attributes(Some("https://example.com/a"), &config, false).secure);
        assert!(!compute_cookie_attributes(Some("http://localhost:3000/a"), &config, false).secure);
    }

    #[test]
    fn test_secure_defaults_to_true_without_usable_url() {
        let config = CookieConfig::default();
        assert!(compute_cookie_attributes(None, &config, false).secure);
        assert!(compute_cookie_attributes(Some("::garbage::"), &config, false).secure);
    }

    #[test]
    fn test_secure_uses_fallback_url() {
        let config = CookieConfig::default().with_fallback_url("http://localhost:3000/callback");
        assert!(!compute_cookie_attributes(None, &config, false).secure);
        // An explicit target wins over the fallback
        assert!(compute_cookie_attributes(Some("https://example.com"), &config, false).secure);
    }

    #[test]
    fn test_max_age_resolution() {
        let config = CookieConfig::default();
        assert_eq!(
            compute_cookie_attributes(None, &config, false).max_age,
            34_560_000
        );
        assert_eq!(compute_cookie_attributes(None, &config, true).max_age, 0);

        let config = CookieConfig::default().with_max_age("3600");
        assert_eq!(compute_cookie_attributes(None, &config, false).max_age, 3600);
        assert_eq!(compute_cookie_attributes(None, &config, true).max_age, 0);

        let config = CookieConfig::default().with_max_age("one hour");
        assert_eq!(
            compute_cookie_attributes(None, &config, false).max_age,
            DEFAULT_MAX_AGE_SECONDS
        );
    }

    #[test]
    fn test_non_positive_max_age_falls_back() {
        for raw in ["0", "-1", " -3600 "] {
            let config = CookieConfig::default().with_max_age(raw);
            let attrs = compute_cookie_attributes(None, &config, false);
            assert_eq!(attrs.max_age, DEFAULT_MAX_AGE_SECONDS, "override {raw:?}");
            assert!(!CookieWrite::set("authkit-session", "sealed", &attrs).is_deletion());
        }
    }

    #[test]
    fn test_domain_is_verbatim_or_absent() {
        let attrs = compute_cookie_attributes(None, &CookieConfig::default(), false);
        assert!(attrs.domain.is_none());

        let config = CookieConfig::default().with_domain("example.com");
        let attrs = compute_cookie_attributes(None, &config, false);
        assert_eq!(attrs.domain.as_deref(), Some("example.com"));

        let config = CookieConfig::default().with_domain("");
        assert!(compute_cookie_attributes(None, &config, false).domain.is_none());
    }

    #[test]
    fn test_header_fragment() {
        let config = CookieConfig::default();
        assert_eq!(
            cookie_attributes_header(Some("http://localhost"), &config, false),
            "Path=/; HttpOnly; SameSite=Lax; Max-Age=34560000"
        );

        let config = CookieConfig::default()
            .with_domain("example.com")
            .with_same_site("strict")
            .unwrap();
        assert_eq!(
            cookie_attributes_header(Some("https://example.com"), &config, true),
            "Path=/; HttpOnly; SameSite=Strict; Max-Age=0; Domain=example.com; Secure"
        );
    }

    #[test]
    fn test_build_cookie() {
        let config = CookieConfig::default().with_domain("example.com");
        let attrs = compute_cookie_attributes(Some("https://example.com"), &config, false);
        let cookie = attrs.build_cookie("session", "value");

        assert_eq!(cookie.name(), "session");
        assert_eq!(cookie.value(), "value");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age().unwrap().whole_seconds(), DEFAULT_MAX_AGE_SECONDS);
    }

    #[test]
    fn test_cookie_write_delete_keeps_attributes() {
        let config = CookieConfig::default()
            .with_domain("example.com")
            .with_same_site("none")
            .unwrap();
        let attrs = compute_cookie_attributes(None, &config, false);
        let deletion = CookieWrite::delete("session.1", &attrs);

        assert!(deletion.is_deletion());
        assert_eq!(deletion.value, "");
        assert_eq!(deletion.attributes.domain.as_deref(), Some("example.com"));
        assert_eq!(deletion.attributes.same_site, SameSitePolicy::None);
        assert_eq!(
            deletion.to_header_value(),
            "session.1=; Path=/; HttpOnly; SameSite=None; Max-Age=0; Domain=example.com; Secure"
        );
    }
}
