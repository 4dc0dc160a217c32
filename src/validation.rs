//! Domain validation rules for every entity this crate persists.
//!
//! Entities are validated after construction and before they reach the
//! store. A non-empty violation list aborts the surrounding unit of work.

use crate::errors::LoaderError;

const MAX_NAME_LEN: usize = 255;
const MAX_ORGANIZATION_NAME_LEN: usize = 128;
const MAX_USERNAME_LEN: usize = 128;

/// One failed rule on one field of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub trait Validate {
    /// Short description used in error messages.
    fn entity_name(&self) -> String;

    fn violations(&self) -> Vec<Violation>;
}

/// Fail with [`LoaderError::Validation`] when `entity` breaks any rule.
pub fn ensure_valid<T: Validate + ?Sized>(entity: &T) -> Result<(), LoaderError> {
    let violations = entity.violations();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(LoaderError::Validation {
            entity: entity.entity_name(),
            violations,
        })
    }
}

/// Collects violations for one entity.
#[derive(Debug, Default)]
pub(crate) struct Rules {
    violations: Vec<Violation>,
}

impl Rules {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn not_blank(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.violations
                .push(Violation::new(field, "must not be blank"));
        }
        self
    }

    pub(crate) fn max_len(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        if value.chars().count() > max {
            self.violations.push(Violation::new(
                field,
                format!("must be at most {max} characters long"),
            ));
        }
        self
    }

    pub(crate) fn no_whitespace(&mut self, field: &str, value: &str) -> &mut Self {
        if value.chars().any(char::is_whitespace) {
            self.violations
                .push(Violation::new(field, "must not contain whitespace"));
        }
        self
    }

    pub(crate) fn name(&mut self, field: &str, value: &str) -> &mut Self {
        self.not_blank(field, value)
            .max_len(field, value, MAX_NAME_LEN)
            .no_whitespace(field, value)
    }

    pub(crate) fn optional_name(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value {
            self.name(field, v);
        }
        self
    }

    pub(crate) fn optional_text(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value {
            self.max_len(field, v, MAX_NAME_LEN);
        }
        self
    }

    pub(crate) fn organization_name(&mut self, field: &str, value: &str) -> &mut Self {
        self.not_blank(field, value)
            .max_len(field, value, MAX_ORGANIZATION_NAME_LEN);
        if !value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            self.violations.push(Violation::new(
                field,
                "may only contain lowercase letters, digits, `-` and `_`",
            ));
        }
        self
    }

    pub(crate) fn username(&mut self, field: &str, value: &str) -> &mut Self {
        self.not_blank(field, value)
            .max_len(field, value, MAX_USERNAME_LEN)
            .no_whitespace(field, value)
    }

    pub(crate) fn email(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(email) = value {
            let valid = match email.split_once('@') {
                Some((local, domain)) => {
                    !local.is_empty()
                        && !domain.is_empty()
                        && !domain.contains('@')
                        && !email.chars().any(char::is_whitespace)
                }
                None => false,
            };
            if !valid {
                self.violations
                    .push(Violation::new(field, "is not a valid email address"));
            }
        }
        self
    }

    pub(crate) fn each_not_blank(&mut self, field: &str, values: &[String]) -> &mut Self {
        for (i, v) in values.iter().enumerate() {
            if v.trim().is_empty() {
                self.violations
                    .push(Violation::new(format!("{field}[{i}]"), "must not be blank"));
            }
        }
        self
    }

    pub(crate) fn check(&mut self, field: &str, ok: bool, message: &str) -> &mut Self {
        if !ok {
            self.violations.push(Violation::new(field, message));
        }
        self
    }

    pub(crate) fn finish(&mut self) -> Vec<Violation> {
        std::mem::take(&mut self.violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(String);

    impl Validate for Named {
        fn entity_name(&self) -> String {
            format!("thing `{}`", self.0)
        }

        fn violations(&self) -> Vec<Violation> {
            Rules::new().name("name", &self.0).finish()
        }
    }

    #[test]
    fn test_ensure_valid_passes() {
        assert!(ensure_valid(&Named("ROLE_ADMIN".into())).is_ok());
    }

    #[test]
    fn test_ensure_valid_reports_all_violations() {
        let err = ensure_valid(&Named("  ".into())).unwrap_err();
        match err {
            LoaderError::Validation { entity, violations } => {
                assert_eq!(entity, "thing `  `");
                assert_eq!(violations.len(), 2);
                assert_eq!(violations[0].message, "must not be blank");
                assert_eq!(violations[1].message, "must not contain whitespace");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_email_rule() {
        let ok = Rules::new().email("email", Some("admin@example.tld")).finish();
        assert!(ok.is_empty());

        for bad in ["admin", "@example.tld", "admin@", "a@b@c", "ad min@x.y"] {
            let v = Rules::new().email("email", Some(bad)).finish();
            assert_eq!(v.len(), 1, "expected `{bad}` to be rejected");
        }

        assert!(Rules::new().email("email", None).finish().is_empty());
    }

    #[test]
    fn test_organization_name_rule() {
        assert!(Rules::new()
            .organization_name("name", "org-admin")
            .finish()
            .is_empty());
        assert_eq!(
            Rules::new().organization_name("name", "Org Admin").finish().len(),
            1
        );
    }

    #[test]
    fn test_max_len_rule() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        let v = Rules::new().name("name", &long).finish();
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("at most 255"));
    }
}
