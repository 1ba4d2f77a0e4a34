#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the authkit-session crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod handlers;
pub mod models;
pub mod provider;
pub mod session;
pub mod settings;
pub mod utils;

// Make test utilities available for both unit tests and integration tests
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use handlers::{callback, refresh, session_info, sign_in, sign_out, RequestCookieStore};
pub use models::{AuthenticationResponse, Session, User};
pub use provider::{AuthProvider, HttpAuthProvider, ProviderError};
pub use session::{
    AccessTokenClaims, CookieConfig, CookieStore, SessionCodec, SessionError, SessionManager,
    SessionState,
};
pub use settings::AuthkitSettings;
pub use utils::request::{MiddlewareOptions, OptionsSource, RequestContext};
