/// Verify an admin API key using a constant-time comparison so the key cannot
/// be guessed byte-by-byte through response timing.
pub fn verify_api_key(provided: &str, expected: &str) -> bool {
    !expected.is_empty()
        && provided.len() == expected.len()
        && provided
            .as_bytes()
            .iter()
            .zip(expected.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_api_key_valid() {
        assert!(verify_api_key("test-key", "test-key"));
    }

    #[test]
    fn test_verify_api_key_invalid() {
        assert!(!verify_api_key("wrong-key", "test-key"));
    }

    #[test]
    fn test_verify_api_key_different_length() {
        assert!(!verify_api_key("short", "much-longer-key"));
    }

    #[test]
    fn test_verify_api_key_empty_expected_rejects() {
        // An unset key must not open the admin surface to everyone
        assert!(!verify_api_key("", ""));
        assert!(!verify_api_key("anything", ""));
    }

    #[test]
    fn test_verify_api_key_case_sensitive() {
        assert!(!verify_api_key("Test-Key", "test-key"));
    }
}
