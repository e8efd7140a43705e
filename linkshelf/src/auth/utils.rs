//! Authentication utility functions.

use rand::Rng;

/// Generate a username for a profile that registered without choosing one.
/// Format: `user_` followed by 8 lowercase hex digits, e.g. `user_3f9a0c1e`.
pub fn generate_username() -> String {
    let n: u32 = rand::thread_rng().r#gen();
    format!("user_{n:08x}")
}

/// Local part of an email, used as a default display name
pub fn display_name_from_email(email: &str) -> Option<String> {
    email.split('@').next().filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::profiles::normalize_username;

    #[test]
    fn test_generated_username_is_valid() {
        for _ in 0..20 {
            let username = generate_username();
            assert_eq!(username.len(), 13);
            assert_eq!(normalize_username(&username).unwrap(), username);
        }
    }

    #[test]
    fn test_display_name_from_email() {
        assert_eq!(display_name_from_email("jo@example.com").as_deref(), Some("jo"));
        assert_eq!(display_name_from_email("@example.com"), None);
    }
}
