//! API key generation and hashing.
//!
//! Keys look like `ls_<43 base64url chars>`. Only the SHA-256 hex digest and
//! a short display prefix are stored; the plaintext is shown once.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

pub const API_KEY_PREFIX: &str = "ls_";

/// Characters of the key kept for display (`ls_` plus 8)
const DISPLAY_PREFIX_LEN: usize = 11;

/// A freshly generated key
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    pub plaintext: String,
    pub prefix: String,
    pub hash: String,
}

pub fn generate_api_key() -> GeneratedApiKey {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    let plaintext = format!("{API_KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes));

    GeneratedApiKey {
        prefix: plaintext.chars().take(DISPLAY_PREFIX_LEN).collect(),
        hash: hash_api_key(&plaintext),
        plaintext,
    }
}

/// Lowercase hex SHA-256 of the full key
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_shape() {
        let key = generate_api_key();
        assert!(key.plaintext.starts_with(API_KEY_PREFIX));
        assert_eq!(key.plaintext.len(), 3 + 43);
        assert_eq!(key.prefix.len(), DISPLAY_PREFIX_LEN);
        assert!(key.plaintext.starts_with(&key.prefix));
        assert_eq!(key.hash.len(), 64);
        assert_eq!(key.hash, hash_api_key(&key.plaintext));
    }

    #[test]
    fn test_keys_are_unique() {
        assert_ne!(generate_api_key().plaintext, generate_api_key().plaintext);
    }

    #[test]
    fn test_hash_known_value() {
        assert_eq!(
            hash_api_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
