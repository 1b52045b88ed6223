//! Pre-flight checks on a composed post
//!
//! Runs before any network call so that an over-long post or too many
//! images never costs an upload.

use crate::error::{Result, SkycastError};

/// Maximum post length in characters
pub const MAX_POST_CHARS: usize = 300;

/// Posts longer than this draw a warning; most readers see a "show more"
const LONG_POST_WARN_CHARS: usize = 280;

#[derive(Debug, Clone)]
pub struct ValidationService {
    max_images: usize,
}

/// Outcome of validating one composed post
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResponse {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Non-blocking
    pub warnings: Vec<String>,
}

impl ValidationService {
    pub fn new(max_images: usize) -> Self {
        Self { max_images }
    }

    pub fn max_images(&self) -> usize {
        self.max_images
    }

    /// Validate composed text (hashtags already appended) and image count
    pub fn validate(&self, text: &str, image_count: usize) -> ValidationResponse {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if text.trim().is_empty() && image_count == 0 {
            errors.push("Post has no text and no images".to_string());
        }

        let chars = text.chars().count();
        if chars > MAX_POST_CHARS {
            errors.push(format!(
                "Post is {} characters, limit is {}",
                chars, MAX_POST_CHARS
            ));
        } else if chars > LONG_POST_WARN_CHARS {
            warnings.push(format!(
                "Post is {} characters, close to the {} limit",
                chars, MAX_POST_CHARS
            ));
        }

        if image_count > self.max_images {
            errors.push(format!(
                "Post has {} images, limit is {}",
                image_count, self.max_images
            ));
        }

        ValidationResponse {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Like [`validate`](Self::validate), failing with `InvalidInput`
    pub fn check(&self, text: &str, image_count: usize) -> Result<ValidationResponse> {
        let response = self.validate(text, image_count);
        if !response.valid {
            return Err(SkycastError::InvalidInput(response.errors.join("; ")));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_text_only() {
        let response = ValidationService::new(4).validate("Hello world", 0);
        assert!(response.valid);
        assert!(response.errors.is_empty());
        assert!(response.warnings.is_empty());
    }

    #[test]
    fn test_images_without_text_are_valid() {
        assert!(ValidationService::new(4).validate("", 2).valid);
    }

    #[test]
    fn test_empty_post_rejected() {
        let response = ValidationService::new(4).validate("   \n", 0);
        assert!(!response.valid);
        assert!(response.errors[0].contains("no text"));
    }

    #[test]
    fn test_char_limit_counts_characters_not_bytes() {
        let service = ValidationService::new(4);

        // 300 two-byte characters are within the limit
        let text = "é".repeat(300);
        assert_eq!(text.len(), 600);
        assert!(service.validate(&text, 0).valid);

        let too_long = "a".repeat(301);
        let response = service.validate(&too_long, 0);
        assert!(!response.valid);
        assert!(response.errors[0].contains("301"));
    }

    #[test]
    fn test_long_post_warning() {
        let response = ValidationService::new(4).validate(&"a".repeat(290), 0);
        assert!(response.valid);
        assert_eq!(response.warnings.len(), 1);
    }

    #[test]
    fn test_too_many_images() {
        let response = ValidationService::new(4).validate("hi", 5);
        assert!(!response.valid);
        assert!(response.errors[0].contains("5 images"));
    }

    #[test]
    fn test_check_maps_to_invalid_input() {
        let service = ValidationService::new(1);
        let result = service.check("", 0);
        assert!(matches!(result, Err(SkycastError::InvalidInput(_))));

        assert!(service.check("fine", 1).is_ok());
    }

    #[test]
    fn test_check_joins_all_errors() {
        let service = ValidationService::new(1);
        match service.check(&"x".repeat(301), 2) {
            Err(SkycastError::InvalidInput(msg)) => {
                assert!(msg.contains("characters"));
                assert!(msg.contains("images"));
            }
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }
}
