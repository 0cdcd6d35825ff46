//! Field validation for request values.
//!
//! Collects every problem before failing, so a client sees all of them at
//! once as `ServiceError::ValidationFailed`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{FieldErrors, ServiceError};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

/// Accumulates field errors.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, field: &str, message: String) {
        self.errors.entry(field.to_string()).or_default().push(message);
    }

    /// A present, non-blank string. Returns it (or empty if missing).
    pub fn required<'a>(&mut self, field: &str, value: Option<&'a str>) -> &'a str {
        match value {
            Some(v) if !v.trim().is_empty() => v,
            _ => {
                self.fail(field, format!("The {field} field is required."));
                ""
            }
        }
    }

    /// At most `max` characters. Missing values pass.
    pub fn max_chars(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(v) = value {
            if v.chars().count() > max {
                self.fail(
                    field,
                    format!("The {field} field must not be greater than {max} characters."),
                );
            }
        }
    }

    /// At least `min` characters. Missing values pass.
    pub fn min_chars(&mut self, field: &str, value: Option<&str>, min: usize) {
        if let Some(v) = value {
            if v.chars().count() < min {
                self.fail(field, format!("The {field} field must be at least {min} characters."));
            }
        }
    }

    /// Looks like an email address. Missing values pass.
    pub fn email(&mut self, field: &str, value: Option<&str>) {
        if let Some(v) = value {
            if !v.is_empty() && !EMAIL.is_match(v) {
                self.fail(field, format!("The {field} field must be a valid email address."));
            }
        }
    }

    /// Record an error found outside the built-in rules.
    pub fn reject(&mut self, field: &str, message: impl Into<String>) {
        self.fail(field, message.into());
    }

    /// `Ok` if nothing failed.
    pub fn finish(self) -> Result<(), ServiceError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::ValidationFailed(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors(v: Validator) -> FieldErrors {
        match v.finish() {
            Err(ServiceError::ValidationFailed(errors)) => errors,
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn clean_input_passes() {
        let mut v = Validator::new();
        assert_eq!(v.required("message", Some("Hello")), "Hello");
        v.max_chars("title", Some("short"), 255);
        v.email("email", Some("ada@example.com"));
        assert!(v.finish().is_ok());
    }

    #[test]
    fn missing_and_blank_are_required_failures() {
        let mut v = Validator::new();
        v.required("message", None);
        v.required("details", Some("   "));
        let errors = errors(v);
        assert_eq!(errors["message"], vec!["The message field is required."]);
        assert!(errors.contains_key("details"));
    }

    #[test]
    fn length_rules_count_characters() {
        let mut v = Validator::new();
        v.max_chars("title", Some(&"ü".repeat(255)), 255);
        v.min_chars("password", Some("short"), 8);
        let errors = errors(v);
        assert!(!errors.contains_key("title"));
        assert_eq!(
            errors["password"],
            vec!["The password field must be at least 8 characters."]
        );
    }

    #[test]
    fn errors_accumulate_per_field() {
        let mut v = Validator::new();
        v.email("email", Some("not-an-email"));
        v.reject("email", "The email has already been taken.");
        assert_eq!(errors(v)["email"].len(), 2);
    }
}
