//! Sibling name comparison and validation.

use crate::error::ValidationError;
use crate::tree::path::SEPARATOR;
use unicode_normalization::UnicodeNormalization;

/// Comparison key for sibling names: NFC-normalized, then lowercased.
///
/// Two names collide when their keys are equal, so `Users`, `users` and a
/// decomposed `Usérs`/`Usérs` pair are treated as the same sibling.
pub fn name_key(name: &str) -> String {
    name.nfc().collect::<String>().to_lowercase()
}

pub fn names_collide(a: &str, b: &str) -> bool {
    name_key(a) == name_key(b)
}

/// Validate and normalize a user-supplied entry name.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if trimmed.contains(SEPARATOR) || trimmed.contains('\\') {
        return Err(ValidationError::InvalidName {
            name: trimmed.to_string(),
            reason: "names cannot contain path separators".to_string(),
        });
    }
    if trimmed == "." || trimmed == ".." {
        return Err(ValidationError::InvalidName {
            name: trimmed.to_string(),
            reason: "reserved name".to_string(),
        });
    }
    Ok(trimmed.nfc().collect())
}
