//! Sealing session state into an opaque cookie value
//!
//! A sealed string is `base64url(nonce || AES-256-GCM(json) || tag)`. It has no
//! embedded expiry; liveness is governed by the access token's own `exp`.

use anyhow::Result;
use log::debug;
use serde::{de::DeserializeOwned, Serialize};

use crate::models::Session;
use crate::settings::ConfigError;
use crate::utils::crypto::{
    decrypt_data, derive_encryption_key, encrypt_data, ENCRYPTION_KEY_SIZE, MIN_PASSWORD_LENGTH,
};

#[derive(Clone)]
pub struct SessionCodec {
    key: [u8; ENCRYPTION_KEY_SIZE],
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec").finish_non_exhaustive()
    }
}

impl SessionCodec {
    /// Create a codec from the cookie password
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PasswordTooShort` if the password has fewer than
    /// 32 characters
    pub fn new(password: &str) -> Result<Self, ConfigError> {
        let length = password.chars().count();
        if length < MIN_PASSWORD_LENGTH {
            return Err(ConfigError::PasswordTooShort(length));
        }
        Ok(Self {
            key: derive_encryption_key(password),
        })
    }

    /// Seal a session
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails
    pub fn seal(&self, session: &Session) -> Result<String> {
        self.seal_value(session)
    }

    /// Unseal a session; any failure is treated as no session
    #[must_use]
    pub fn unseal(&self, sealed: &str) -> Option<Session> {
        self.unseal_value(sealed)
    }

    /// Seal any serializable value under the same key
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails
    pub fn seal_value<T: Serialize>(&self, value: &T) -> Result<String> {
        encrypt_data(value, &self.key)
    }

    #[must_use]
    pub fn unseal_value<T: DeserializeOwned>(&self, sealed: &str) -> Option<T> {
        match decrypt_data(sealed, &self.key) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Discarding sealed value ({} chars): {e}", sealed.len());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::TestFixtures;

    const PASSWORD: &str = "test_cookie_password_at_least_32_chars";

    #[test]
    fn test_short_password_rejected() {
        let err = SessionCodec::new("too-short").unwrap_err();
        assert!(matches!(err, ConfigError::PasswordTooShort(9)));
        assert!(SessionCodec::new(&"x".repeat(32)).is_ok());
    }

    #[test]
    fn test_seal_unseal_roundtrip() {
        let codec = SessionCodec::new(PASSWORD).unwrap();
        let session = TestFixtures::session();
        let sealed = codec.seal(&session).unwrap();
        assert_eq!(codec.unseal(&sealed), Some(session));
    }

    #[test]
    fn test_tampered_seal_is_none() {
        let codec = SessionCodec::new(PASSWORD).unwrap();
        let sealed = codec.seal(&TestFixtures::session()).unwrap();

        let mut bytes = sealed.into_bytes();
        let middle = bytes.len() / 2;
        bytes[middle] = if bytes[middle] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert_eq!(codec.unseal(&tampered), None);
    }

    #[test]
    fn test_truncated_or_garbage_is_none() {
        let codec = SessionCodec::new(PASSWORD).unwrap();
        let sealed = codec.seal(&TestFixtures::session()).unwrap();
        assert_eq!(codec.unseal(&sealed[..sealed.len() - 5]), None);
        assert_eq!(codec.unseal(""), None);
        assert_eq!(codec.unseal("not-a-sealed-value"), None);
    }

    #[test]
    fn test_foreign_key_is_none() {
        let codec = SessionCodec::new(PASSWORD).unwrap();
        let other = SessionCodec::new("another_password_that_is_32_chars_long").unwrap();
        let sealed = codec.seal(&TestFixtures::session()).unwrap();
        assert_eq!(other.unseal(&sealed), None);
    }
}
