use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::session::cookie::{CookieConfig, SameSitePolicy, DEFAULT_COOKIE_NAME};
use crate::utils::crypto::MIN_PASSWORD_LENGTH;

/// Default provider API origin
pub const DEFAULT_API_BASE_URL: &str = "https://api.workos.com";

/// Configuration errors; all of them are fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("missing required configuration value: {0}")]
    MissingValue(&'static str),

    #[error("cookie password must be at least 32 characters long (got {0})")]
    PasswordTooShort(usize),

    #[error("invalid sameSite value '{0}': expected one of lax, strict, none")]
    InvalidSameSite(String),

    #[error("invalid URL for {field}: '{value}'")]
    InvalidUrl { field: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthkitSettings {
    pub application: ApplicationSettings,
    pub provider: ProviderSettings,
    pub cookies: CookieSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApplicationSettings {
    /// Callback URL registered with the provider; also the fallback URL used
    /// to decide the cookie `Secure` flag when no request URL is known
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub client_id: String,
    pub api_key: String,
    pub api_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub name: String,
    pub domain: Option<String>,
    /// Max-Age override in seconds; kept as a string so that an unparseable
    /// value falls back to the default instead of failing the whole file
    pub max_age: Option<String>,
    pub same_site: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub cookie_password: String,
    /// Refresh expired access tokens while authenticating a request
    pub auto_refresh: bool,
    /// Treat access tokens as expired this many seconds early
    pub refresh_leeway_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            api_key: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            domain: None,
            max_age: None,
            same_site: None,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_password: String::new(),
            auto_refresh: true,
            refresh_leeway_seconds: 0,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AuthkitSettings {
    /// Load settings from configuration files and environment variables, then validate
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read or parsed
    /// - A required value is missing or invalid after all overrides are applied
    pub fn load() -> Result<Self, ConfigError> {
        Self::initialize_environment();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        settings.validate()?;

        info!(
            "Loaded settings: cookie name '{}', cookie domain {:?}, api {}",
            settings.cookies.name, settings.cookies.domain, settings.provider.api_base_url
        );
        Ok(settings)
    }

    /// Load .env and initialize logging
    fn initialize_environment() {
        Self::load_env_file();
        if env_logger::try_init().is_err() {
            debug!("Logger already initialized");
        }
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `AUTHKIT_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    fn load_base_settings() -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        let default_config_path = Path::new("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(default_config_path)?;
            info!("Loaded base settings from {}", default_config_path.display());
        }

        if let Ok(secrets_dir) = std::env::var("AUTHKIT_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                info!("Overriding settings from {}", secrets_path.display());
            } else {
                info!(
                    "AUTHKIT_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse a single TOML settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        basic_toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_string_env_override(
            "AUTHKIT_REDIRECT_URI",
            &mut settings.application.redirect_uri,
        );
        Self::apply_string_env_override("AUTHKIT_CLIENT_ID", &mut settings.provider.client_id);
        Self::apply_string_env_override("AUTHKIT_API_KEY", &mut settings.provider.api_key);
        Self::apply_string_env_override(
            "AUTHKIT_API_BASE_URL",
            &mut settings.provider.api_base_url,
        );
        Self::apply_string_env_override(
            "AUTHKIT_COOKIE_PASSWORD",
            &mut settings.session.cookie_password,
        );
        Self::apply_string_env_override("AUTHKIT_COOKIE_NAME", &mut settings.cookies.name);
        Self::apply_optional_env_override("AUTHKIT_COOKIE_DOMAIN", &mut settings.cookies.domain);
        Self::apply_optional_env_override("AUTHKIT_COOKIE_MAX_AGE", &mut settings.cookies.max_age);
        Self::apply_optional_env_override(
            "AUTHKIT_COOKIE_SAMESITE",
            &mut settings.cookies.same_site,
        );

        if let Ok(value) = std::env::var("AUTHKIT_AUTO_REFRESH") {
            if let Ok(auto_refresh) = value.parse::<bool>() {
                settings.session.auto_refresh = auto_refresh;
            }
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            settings.logging.level = level;
        }
    }

    fn apply_string_env_override(env_var: &str, target: &mut String) {
        if let Ok(value) = std::env::var(env_var) {
            if !value.is_empty() {
                *target = value;
            }
        }
    }

    fn apply_optional_env_override(env_var: &str, target: &mut Option<String>) {
        if let Ok(value) = std::env::var(env_var) {
            *target = Some(value).filter(|v| !v.is_empty());
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if line.trim_start().starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Check every value required to serve requests
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.client_id.is_empty() {
            return Err(ConfigError::MissingValue("provider.client_id"));
        }
        if self.provider.api_key.is_empty() {
            return Err(ConfigError::MissingValue("provider.api_key"));
        }
        if self.application.redirect_uri.is_empty() {
            return Err(ConfigError::MissingValue("application.redirect_uri"));
        }
        if url::Url::parse(&self.application.redirect_uri).is_err() {
            return Err(ConfigError::InvalidUrl {
                field: "application.redirect_uri",
                value: self.application.redirect_uri.clone(),
            });
        }
        if url::Url::parse(&self.provider.api_base_url).is_err() {
            return Err(ConfigError::InvalidUrl {
                field: "provider.api_base_url",
                value: self.provider.api_base_url.clone(),
            });
        }
        if self.session.cookie_password.is_empty() {
            return Err(ConfigError::MissingValue("session.cookie_password"));
        }
        let password_len = self.session.cookie_password.chars().count();
        if password_len < MIN_PASSWORD_LENGTH {
            return Err(ConfigError::PasswordTooShort(password_len));
        }
        SameSitePolicy::parse(self.cookies.same_site.as_deref())?;
        Ok(())
    }

    /// Build the cookie configuration used by the session manager
    ///
    /// # Errors
    ///
    /// Returns an error if the configured sameSite value is invalid
    pub fn cookie_config(&self) -> Result<CookieConfig, ConfigError> {
        Ok(CookieConfig {
            name: self.cookies.name.clone(),
            domain: self.cookies.domain.clone().filter(|d| !d.is_empty()),
            same_site: SameSitePolicy::parse(self.cookies.same_site.as_deref())?,
            max_age: self.cookies.max_age.clone(),
            fallback_url: Some(self.application.redirect_uri.clone()).filter(|u| !u.is_empty()),
        })
    }
}
