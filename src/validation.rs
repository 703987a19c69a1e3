//! Input validation and sanitization.
//!
//! Runs before anything reaches a session's history or the model.

use crate::error::{ChatError, InputRejection, Result};

/// Cleans raw user text or rejects it
#[derive(Debug, Clone, Copy)]
pub struct InputValidator {
    max_chars: usize,
}

impl InputValidator {
    /// Validator rejecting raw input longer than `max_chars`
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Configured character limit
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Returns the sanitized text, or `InvalidInput` when nothing usable is left
    /// or the raw text is over the character limit.
    pub fn sanitize(&self, raw: &str) -> Result<String> {
        let chars = raw.chars().count();
        if chars > self.max_chars {
            return Err(ChatError::InvalidInput(InputRejection::TooLong {
                chars,
                max: self.max_chars,
            }));
        }

        let cleaned: String = raw.chars().filter(|c| keep_char(*c)).collect();
        let trimmed = cleaned.trim();
        if trimmed.is_empty() {
            return Err(ChatError::InvalidInput(InputRejection::Empty));
        }

        Ok(trimmed.to_string())
    }

    /// Whether `sanitize` would accept the input
    pub fn is_valid(&self, raw: &str) -> bool {
        self.sanitize(raw).is_ok()
    }
}

// Newlines and tabs are ordinary whitespace; every other control char goes.
fn keep_char(c: char) -> bool {
    !c.is_control() || c == '\n' || c == '\t'
}
