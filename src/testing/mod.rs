//! Testing utilities for unit and integration tests
//!
//! Available under `cfg(test)` and behind the `testing` feature.
//!
//! ## Organization
//!
//! - [`fixtures`] - Pre-built test data (users, sessions, settings, managers)
//! - [`builders`] - Fluent builder for sessions with custom claims
//! - [`mock`] - In-memory `AuthProvider` with scripted responses
//! - [`store`] - In-memory cookie store honouring cookie attributes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use authkit_session::testing::{MockAuthProvider, TestFixtures, TestSessionBuilder};
//!
//! let provider = Arc::new(MockAuthProvider::new());
//! let manager = TestFixtures::session_manager(provider.clone());
//! let session = TestSessionBuilder::new().with_organization("org_1").build();
//! ```

pub mod builders;
pub mod fixtures;
pub mod mock;
pub mod store;

// Re-export commonly used items for convenience
pub use builders::TestSessionBuilder;
pub use fixtures::TestFixtures;
pub use mock::MockAuthProvider;
pub use store::MemoryCookieStore;

/// Common test constants
pub mod constants {
    /// Default test email address
    pub const TEST_EMAIL: &str = "test@example.com";

    /// Default test user id
    pub const TEST_USER_ID: &str = "user_01TEST";

    /// Default access-token session id
    pub const TEST_SESSION_ID: &str = "session_01TEST";

    /// Cookie password of exactly the minimum length plus margin
    pub const TEST_COOKIE_PASSWORD: &str = "test_cookie_password_at_least_32_chars";

    /// Redirect URI used by test managers
    pub const TEST_REDIRECT_URI: &str = "http://localhost:3000/callback";

    /// Base URL of the mock provider
    pub const TEST_PROVIDER_URL: &str = "https://auth.example.com";
}
