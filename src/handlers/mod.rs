// actix-web glue for the session layer
pub mod auth;
pub mod callback;
pub mod cookies;
pub mod helpers;

#[cfg(test)]
mod tests;

// Re-export the main handler functions
pub use auth::{refresh, session_info, sign_in, sign_out};
pub use callback::callback;
pub use cookies::RequestCookieStore;
pub use helpers::{attach_session_headers, redirect_response};
