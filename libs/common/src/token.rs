//! Identifier and session token generation
//!
//! Record identifiers and session tokens are short random strings rather
//! than UUIDs, for compatibility with the documents already stored by the
//! backing store.

use rand::Rng;

/// Characters used for record identifiers.
const ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Characters used for the random part of a session token.
const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a generated record identifier.
pub const RECORD_ID_LEN: usize = 10;

/// Length of the random part of a session token.
pub const SESSION_TOKEN_LEN: usize = 32;

/// Prefix carried by every session token.
pub const SESSION_TOKEN_PREFIX: &str = "sst:";

fn random_from(charset: &[u8], length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

/// Generate a random record identifier (10 mixed-case alphanumerics).
pub fn record_id() -> String {
    random_from(ID_CHARSET, RECORD_ID_LEN)
}

/// Generate an opaque session token of the form `sst:<32 lowercase alphanumerics>`.
pub fn session_token() -> String {
    format!(
        "{}{}",
        SESSION_TOKEN_PREFIX,
        random_from(TOKEN_CHARSET, SESSION_TOKEN_LEN)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_are_alphanumeric_and_unique() {
        let a = record_id();
        let b = record_id();
        assert_eq!(a.len(), RECORD_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b, "two generated identifiers collided");
    }

    #[test]
    fn session_tokens_carry_prefix_and_lowercase_body() {
        let token = session_token();
        assert!(token.starts_with(SESSION_TOKEN_PREFIX));
        let body = &token[SESSION_TOKEN_PREFIX.len()..];
        assert_eq!(body.len(), SESSION_TOKEN_LEN);
        assert!(
            body.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }
}
