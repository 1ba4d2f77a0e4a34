//! Session Management Module
//!
//! Sealed, chunked cookie sessions.
//!
//! # Modules
//!
//! - [`chunker`] - Splitting large values across `name.N` cookies
//! - [`cookie`] - Cookie security attributes and cookie writes
//! - [`store`] - Cookie store abstraction
//! - [`codec`] - Sealing and unsealing session state
//! - [`claims`] - Unverified access-token claim decoding
//! - [`pkce`] - PKCE verifier state for the sign-in round trip
//! - [`manager`] - Session lifecycle: read, refresh, sign-in, sign-out

pub mod chunker;
pub mod claims;
pub mod codec;
pub mod cookie;
pub mod manager;
pub mod pkce;
pub mod store;

// Re-export commonly used items for convenience
pub use claims::{decode_claims, AccessTokenClaims, ClaimsError};
pub use codec::SessionCodec;
pub use cookie::{
    compute_cookie_attributes, CookieAttributes, CookieConfig, CookieWrite, SameSitePolicy,
    DEFAULT_COOKIE_NAME, PKCE_COOKIE_NAME,
};
pub use manager::{
    AuthenticatedRequest, AuthenticatedSession, CallbackOutcome, RefreshOutcome, SessionError,
    SessionManager, SessionState, SignInOptions, SignInRedirect, SignOutOutcome,
};
pub use store::CookieStore;
