use miette::Diagnostic;
use thiserror::Error;

use crate::validation::Violation;

/// A single record rejected by the store, with the reasons it was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    /// Human readable description of the rejected entity, e.g. `permission view:Invoice:`
    pub entity: String,
    pub violations: Vec<Violation>,
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.entity, join_violations(&self.violations))
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum LoaderError {
    #[error("Invalid configuration at `{path}`: {message}")]
    #[diagnostic(
        code(permsync::schema),
        help("Top-level keys are `permission_templates`, `permissions` and `permission_classes`")
    )]
    Schema { path: String, message: String },

    #[error("The roles \"{}\" are required, but do not exist in the database", .0.join("\", \""))]
    #[diagnostic(
        code(permsync::missing_roles),
        help("Run `permsync init-roles` first, or declare the roles in security_roles.yaml")
    )]
    MissingRoles(Vec<String>),

    #[error("Invalid {entity}: {}", join_violations(.violations))]
    #[diagnostic(code(permsync::validation))]
    Validation {
        entity: String,
        violations: Vec<Violation>,
    },

    #[error("The store rejected {} record(s): {}", .errors.len(), join_records(.errors))]
    #[diagnostic(code(permsync::persistence))]
    Persistence { errors: Vec<RecordError> },

    #[error("Failed to read data file `{path}`")]
    #[diagnostic(
        code(permsync::file_load),
        help("Check that the file exists and is readable from the configured `data.dir`")
    )]
    FileLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    #[diagnostic(code(permsync::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(permsync::config))]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    #[diagnostic(code(permsync::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(permsync::serde))]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    #[diagnostic(code(permsync::unexpected))]
    Unexpected(String),
}

impl LoaderError {
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        LoaderError::Schema {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<serde_yaml::Error> for LoaderError {
    fn from(value: serde_yaml::Error) -> Self {
        let path = match value.location() {
            Some(loc) => format!("<document>:{}:{}", loc.line(), loc.column()),
            None => "<document>".to_string(),
        };
        LoaderError::Schema {
            path,
            message: value.to_string(),
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_records(errors: &[RecordError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}
