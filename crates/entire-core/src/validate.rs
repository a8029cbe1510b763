//! Session id validation.
//!
//! Session ids are agent-provided and become path components (state file
//! names, metadata tree paths), so they are validated against a conservative
//! charset before touching disk.

use crate::error::EntireError;

/// Maximum accepted session id length.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Validate an agent-provided session id: `[A-Za-z0-9_-]+`, at most 128
/// characters. The charset excludes path separators and dots, so a valid id
/// can never escape its directory or hide as a dotfile.
pub fn validate_session_id(id: &str) -> Result<(), EntireError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(EntireError::InvalidSessionId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_typical_ids() {
        assert!(validate_session_id("0199a1b2-c3d4-7890-abcd-ef0123456789").is_ok());
        assert!(validate_session_id("session_42").is_ok());
        assert!(validate_session_id("A").is_ok());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(validate_session_id("").is_err());
    }

    #[test]
    fn test_rejects_path_separators() {
        assert!(validate_session_id("a/b").is_err());
        assert!(validate_session_id("a\\b").is_err());
        assert!(validate_session_id("../evil").is_err());
    }

    #[test]
    fn test_rejects_dots_and_spaces() {
        assert!(validate_session_id(".hidden").is_err());
        assert!(validate_session_id("a.b").is_err());
        assert!(validate_session_id("a b").is_err());
    }

    #[test]
    fn test_rejects_overlong() {
        let id = "a".repeat(MAX_SESSION_ID_LEN + 1);
        assert!(validate_session_id(&id).is_err());
        let id = "a".repeat(MAX_SESSION_ID_LEN);
        assert!(validate_session_id(&id).is_ok());
    }

    #[test]
    fn test_error_carries_offending_id() {
        let err = validate_session_id("bad/id").unwrap_err();
        assert!(err.to_string().contains("bad/id"));
    }
}
