//! Access key identifier validation

use thiserror::Error;

/// Errors that can occur when validating an access key identifier
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccessKeyValidationError {
    #[error("Access key cannot be empty")]
    Empty,

    #[error("Access key exceeds maximum length of {0} characters")]
    TooLong(usize),

    #[error("Access key contains invalid character: '{0}'. Only alphanumeric characters, '-', '_' and '.' are allowed")]
    InvalidCharacter(char),
}

const MAX_ACCESS_KEY_LENGTH: usize = 128;

/// Validate an access key identifier
///
/// Rules:
/// - Cannot be empty
/// - Maximum 128 characters
/// - Only ASCII alphanumeric characters, '-', '_' and '.'
pub fn validate_access_key_id(key: &str) -> Result<(), AccessKeyValidationError> {
    if key.is_empty() {
        return Err(AccessKeyValidationError::Empty);
    }

    if key.len() > MAX_ACCESS_KEY_LENGTH {
        return Err(AccessKeyValidationError::TooLong(MAX_ACCESS_KEY_LENGTH));
    }

    if let Some(c) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(AccessKeyValidationError::InvalidCharacter(c));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_access_keys() {
        assert!(validate_access_key_id("myCustomKey").is_ok());
        assert!(validate_access_key_id("0f3a9c1b2d4e5f60718293a4b5c6d7e8").is_ok());
        assert!(validate_access_key_id("key_with-mixed.separators").is_ok());
        assert!(validate_access_key_id(&"a".repeat(128)).is_ok());
    }

    #[test]
    fn test_empty_key() {
        assert_eq!(
            validate_access_key_id(""),
            Err(AccessKeyValidationError::Empty)
        );
    }

    #[test]
    fn test_too_long_key() {
        assert_eq!(
            validate_access_key_id(&"a".repeat(129)),
            Err(AccessKeyValidationError::TooLong(128))
        );
    }

    #[test]
    fn test_invalid_character() {
        assert_eq!(
            validate_access_key_id("my key"),
            Err(AccessKeyValidationError::InvalidCharacter(' '))
        );
        assert_eq!(
            validate_access_key_id("key<script>"),
            Err(AccessKeyValidationError::InvalidCharacter('<'))
        );
    }
}
