//! Declarative field validation.
//!
//! A `Validator` accumulates [`Violation`]s over a whole struct before
//! reporting, so a response envelope can carry the complete list instead of
//! the first failure.

use crate::error::{ValidationError, Violation};

#[derive(Default)]
pub struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation::new(path, message));
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.violations))
        }
    }

    pub fn require_str(&mut self, path: &str, value: &str) {
        if value.is_empty() {
            self.push(path, "is required");
        }
    }

    pub fn min_len(&mut self, path: &str, value: &str, min: usize) {
        if !value.is_empty() && value.len() < min {
            self.push(path, format!("must be at least {min} characters"));
        }
    }

    pub fn gte(&mut self, path: &str, value: i64, min: i64) {
        if value < min {
            self.push(path, format!("must be greater than or equal to {min}"));
        }
    }

    /// The value must parse as a URL.
    pub fn uri(&mut self, path: &str, value: &str) {
        if url::Url::parse(value).is_err() {
            self.push(path, "must be a valid URI");
        }
    }

    /// The value must be a URL whose scheme is one of the `|`-separated
    /// alternatives.
    pub fn scheme(&mut self, path: &str, value: &str, allowed: &str) {
        if !scheme_allowed(value, allowed) {
            self.push(
                path,
                format!("unsupported scheme. Only {allowed} supported"),
            );
        }
    }
}

pub fn scheme_allowed(value: &str, allowed: &str) -> bool {
    let Ok(u) = url::Url::parse(value) else {
        return false;
    };
    allowed.split('|').any(|s| s == u.scheme())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_every_violation() {
        let mut v = Validator::new();
        v.require_str("uri", "");
        v.gte("timeout", -5, 0);
        let err = v.finish().unwrap_err();
        assert_eq!(err.violations.len(), 2);
        assert!(err.to_string().contains("uri: is required"));
    }

    #[test]
    fn scheme_list_is_pipe_separated() {
        assert!(scheme_allowed("graphqls://api/q", "graphql|graphqls"));
        assert!(!scheme_allowed("http://api/q", "graphql|graphqls"));
        assert!(!scheme_allowed("not a url", "http"));
    }

    #[test]
    fn min_len_only_applies_to_present_values() {
        let mut v = Validator::new();
        v.min_len("action", "", 5);
        assert!(v.finish().is_ok());
    }
}
