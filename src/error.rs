//! Error types for content-desk.

use std::collections::BTreeMap;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Field name → human readable messages, in a stable order.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Failures surfaced by the auth, content and conversation services.
///
/// Each variant maps to exactly one HTTP status in `api::response`.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation failed")]
    ValidationFailed(FieldErrors),

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Caller may not access {entity} {id}")]
    Forbidden { entity: &'static str, id: String },

    #[error("Generation service responded with status {status}")]
    UpstreamHttpFailure { status: u16, body: String },

    #[error("Generation service unreachable: {reason}")]
    UpstreamUnreachable { reason: String },

    #[error("Internal error: {0}")]
    Internal(#[from] DatabaseError),

    #[error("Password hashing failed: {0}")]
    PasswordHashing(String),
}

impl ServiceError {
    /// Build a single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::ValidationFailed(errors)
    }

    /// Whether this failure is an expected client mistake rather than something
    /// an operator needs to look at.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed(_)
                | Self::Unauthenticated
                | Self::InvalidCredentials
                | Self::NotFound { .. }
        )
    }
}
