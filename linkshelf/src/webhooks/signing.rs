//! HMAC-SHA256 signing following Standard Webhooks.
//!
//! The signed content is `{msg_id}.{timestamp}.{payload}`; the signature is
//! sent as `webhook-signature: v1,<base64>` next to `webhook-id` and
//! `webhook-timestamp`. See <https://www.standardwebhooks.com/>.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SECRET_PREFIX: &str = "whsec_";

const SIGNATURE_VERSION: &str = "v1,";

/// New `whsec_` prefixed secret of 32 random bytes.
pub fn generate_secret() -> String {
    let mut secret_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret_bytes);
    format!("{SECRET_PREFIX}{}", BASE64_STANDARD.encode(secret_bytes))
}

/// Raw key bytes of a `whsec_` secret, `None` if malformed.
pub fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let encoded = secret.strip_prefix(SECRET_PREFIX)?;
    BASE64_STANDARD.decode(encoded).ok()
}

fn mac_for(msg_id: &str, timestamp: i64, payload: &str, secret: &str) -> Option<HmacSha256> {
    let key = decode_secret(secret)?;
    let mut mac = HmacSha256::new_from_slice(&key).ok()?;
    mac.update(msg_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Some(mac)
}

/// Signature header value `v1,<base64>` for a payload.
pub fn sign_payload(msg_id: &str, timestamp: i64, payload: &str, secret: &str) -> Option<String> {
    let signature = mac_for(msg_id, timestamp, payload, secret)?.finalize().into_bytes();
    Some(format!("{SIGNATURE_VERSION}{}", BASE64_STANDARD.encode(signature)))
}

/// Check a `webhook-signature` header, which may carry several
/// space-separated signatures during secret rotation.
pub fn verify_signature(msg_id: &str, timestamp: i64, payload: &str, signature_header: &str, secret: &str) -> bool {
    signature_header.split(' ').any(|candidate| {
        let Some(encoded) = candidate.strip_prefix(SIGNATURE_VERSION) else {
            return false;
        };
        let Ok(expected) = BASE64_STANDARD.decode(encoded) else {
            return false;
        };
        // verify_slice compares in constant time
        mac_for(msg_id, timestamp, payload, secret).is_some_and(|mac| mac.verify_slice(&expected).is_ok())
    })
}

/// Headers attached to one delivery attempt.
pub fn delivery_headers(msg_id: &str, timestamp: i64, signature: String) -> Vec<(String, String)> {
    vec![
        ("content-type".to_string(), "application/json".to_string()),
        ("webhook-id".to_string(), msg_id.to_string()),
        ("webhook-timestamp".to_string(), timestamp.to_string()),
        ("webhook-signature".to_string(), signature),
        ("user-agent".to_string(), concat!("linkshelf-webhooks/", env!("CARGO_PKG_VERSION")).to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret();
        assert!(secret.starts_with(SECRET_PREFIX));
        assert_eq!(decode_secret(&secret).unwrap().len(), 32);
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn test_decode_secret_rejects_malformed() {
        assert!(decode_secret("sk_not_a_webhook_secret").is_none());
        assert!(decode_secret("whsec_not-valid-base64!!!").is_none());
    }

    #[test]
    fn test_sign_and_verify() {
        let secret = generate_secret();
        let payload = r#"{"type":"bookmark.created","data":{}}"#;
        let timestamp = 1_760_000_000;

        let signature = sign_payload("evt_1", timestamp, payload, &secret).unwrap();
        assert!(signature.starts_with("v1,"));
        assert!(verify_signature("evt_1", timestamp, payload, &signature, &secret));

        assert!(!verify_signature("evt_1", timestamp, "tampered", &signature, &secret));
        assert!(!verify_signature("evt_1", timestamp + 1, payload, &signature, &secret));
        assert!(!verify_signature("evt_2", timestamp, payload, &signature, &secret));
        assert!(!verify_signature("evt_1", timestamp, payload, &signature, &generate_secret()));
        assert!(!verify_signature("evt_1", timestamp, payload, "v2,abc", &secret));
    }

    #[test]
    fn test_verify_accepts_any_of_several_signatures() {
        let old = generate_secret();
        let new = generate_secret();
        let payload = "{}";

        let header = format!(
            "{} {}",
            sign_payload("evt", 1, payload, &old).unwrap(),
            sign_payload("evt", 1, payload, &new).unwrap()
        );
        assert!(verify_signature("evt", 1, payload, &header, &new));
        assert!(verify_signature("evt", 1, payload, &header, &old));
    }

    #[test]
    fn test_known_vector() {
        // Example from the Standard Webhooks reference libraries
        let secret = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
        let signature = sign_payload("msg_p5jXN8AQM9LWM0D4loKWxJek", 1614265330, r#"{"test": 2432232314}"#, secret).unwrap();
        assert_eq!(signature, "v1,g0hM9SsE+OTPJTGt/tmIKtSyZlE3uFJELVlNIOLJ1OE=");
    }
}
