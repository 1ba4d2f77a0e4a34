// Cryptographic utilities for sealing cookie payloads and generating PKCE material

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

/// Nonce size for AES-256-GCM encryption (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Encryption key size for AES-256 (256 bits)
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Minimum accepted length of the configured cookie password
pub const MIN_PASSWORD_LENGTH: usize = 32;

/// Authentication tag appended by AES-GCM
const TAG_SIZE: usize = 16;

/// Generate a cryptographically secure random token of `length` bytes
///
/// # Returns
///
/// A base64url-encoded (unpadded) string of the random bytes
#[must_use]
pub fn generate_nonce(length: usize) -> String {
    let mut nonce = vec![0u8; length];
    rand::rng().fill_bytes(&mut nonce);
    general_purpose::URL_SAFE_NO_PAD.encode(nonce)
}

/// Compute the S256 PKCE code challenge for a verifier
///
/// `BASE64URL(SHA256(ASCII(code_verifier)))` as defined by RFC 7636.
#[must_use]
pub fn pkce_challenge(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Derive the 32-byte AES key from the configured cookie password
///
/// The password length is checked by the caller; this only hashes.
#[must_use]
pub fn derive_encryption_key(password: &str) -> [u8; ENCRYPTION_KEY_SIZE] {
    let digest = Sha256::digest(password.as_bytes());
    let mut key = [0u8; ENCRYPTION_KEY_SIZE];
    key.copy_from_slice(&digest);
    key
}

/// Decode a base64url JWT segment, tolerating padded input
///
/// # Errors
///
/// Returns an error if the segment is neither unpadded nor padded base64url
pub fn decode_base64url_segment(segment: &str) -> Result<Vec<u8>> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| general_purpose::URL_SAFE.decode(segment))
        .or_else(|_| general_purpose::STANDARD.decode(segment))
        .context("Base64 decode failed")
}

/// Generic encryption function for any serializable data using AES-256-GCM
///
/// # Arguments
///
/// * `data` - The data to encrypt (must implement Serialize)
/// * `key` - The encryption key (must be 32 bytes for AES-256)
///
/// # Returns
///
/// A Base64URL-encoded string containing the nonce + ciphertext
///
/// # Errors
///
/// Returns an error if:
/// - Serialization fails
/// - Key length is invalid
/// - AES encryption fails
pub fn encrypt_data<T: Serialize>(data: &T, key: &[u8]) -> Result<String> {
    if key.len() != ENCRYPTION_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {ENCRYPTION_KEY_SIZE} bytes, got {}",
            key.len()
        ));
    }

    let json_data = serde_json::to_vec(data).context("Failed to serialize data")?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(nonce, json_data.as_slice())
        .map_err(|e| anyhow!("AES encryption failed: {e}"))?;

    // nonce || ciphertext || tag
    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&combined))
}

/// Generic decryption function for any deserializable data using AES-256-GCM
///
/// # Errors
///
/// Returns an error if:
/// - Key length is invalid
/// - Base64 decoding fails
/// - Data length is invalid
/// - AES decryption fails (wrong key, tampering, truncation)
/// - Deserialization fails
pub fn decrypt_data<T: DeserializeOwned>(encrypted_data: &str, key: &[u8]) -> Result<T> {
    if key.len() != ENCRYPTION_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {ENCRYPTION_KEY_SIZE} bytes, got {}",
            key.len()
        ));
    }

    let combined = general_purpose::URL_SAFE_NO_PAD
        .decode(encrypted_data)
        .context("Failed to decode base64 data")?;

    if combined.len() < NONCE_SIZE + TAG_SIZE {
        return Err(anyhow!("Invalid data length"));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("AES decryption failed: {e}"))?;

    serde_json::from_slice(&plaintext).context("Failed to deserialize data from decrypted JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const TEST_PASSWORD: &str = "test_cookie_password_at_least_32_chars";

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        count: u32,
    }

    fn payload() -> Payload {
        Payload {
            name: "sealed".to_string(),
            count: 7,
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = derive_encryption_key(TEST_PASSWORD);
        let sealed = encrypt_data(&payload(), &key).unwrap();
        let opened: Payload = decrypt_data(&sealed, &key).unwrap();
        assert_eq!(opened, payload());
    }

    #[test]
    fn test_encrypt_uses_fresh_nonce() {
        let key = derive_encryption_key(TEST_PASSWORD);
        let first = encrypt_data(&payload(), &key).unwrap();
        let second = encrypt_data(&payload(), &key).unwrap();
        assert_ne!(first, second, "Each seal should use a new nonce");
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let key = derive_encryption_key(TEST_PASSWORD);
        let other = derive_encryption_key("another_password_that_is_long_enough!");
        let sealed = encrypt_data(&payload(), &key).unwrap();
        assert!(decrypt_data::<Payload>(&sealed, &other).is_err());
    }

    #[test]
    fn test_decrypt_truncated_data_fails() {
        let key = derive_encryption_key(TEST_PASSWORD);
        let sealed = encrypt_data(&payload(), &key).unwrap();
        let truncated = &sealed[..sealed.len() / 2];
        assert!(decrypt_data::<Payload>(truncated, &key).is_err());
        assert!(decrypt_data::<Payload>("", &key).is_err());
        assert!(decrypt_data::<Payload>("AAAA", &key).is_err());
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        let result = encrypt_data(&payload(), b"short");
        assert!(result.unwrap_err().to_string().contains("Invalid key length"));
    }

    #[test]
    fn test_derive_encryption_key_is_deterministic() {
        let a = derive_encryption_key(TEST_PASSWORD);
        let b = derive_encryption_key(TEST_PASSWORD);
        let c = derive_encryption_key("a_completely_different_password_value");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), ENCRYPTION_KEY_SIZE);
    }

    #[test]
    fn test_generate_nonce_length() {
        // 32 bytes -> 43 base64url characters without padding
        let nonce = generate_nonce(32);
        assert_eq!(nonce.len(), 43);
        assert!(!nonce.contains('='));
        assert_ne!(nonce, generate_nonce(32));
    }

    #[test]
    fn test_pkce_challenge_rfc7636_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            pkce_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_decode_base64url_segment_variants() {
        // {"a":1}
        assert_eq!(decode_base64url_segment("eyJhIjoxfQ").unwrap(), b"{\"a\":1}");
        assert_eq!(decode_base64url_segment("eyJhIjoxfQ==").unwrap(), b"{\"a\":1}");
        assert!(decode_base64url_segment("not base64!").is_err());
    }
}
