//! Error types for stagewright.
//!
//! Every failure carries a stable code so that callers (a reconcile loop, the
//! CLI, tests) can decide whether to recreate, retry, or give up.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resources::ResourceKind;

/// Result type alias for stagewright operations.
pub type Result<T> = std::result::Result<T, Error>;

/// stagewright error types.
#[derive(Error, Debug)]
pub enum Error {
    /// The desired spec failed a required-field or minimum-size check.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store lookup found nothing. Recovered locally by creating the object.
    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    /// Store create lost a race. Recovered locally, treated as success.
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    /// Fragment composition or placeholder substitution failed.
    #[error("Template error: {0}")]
    Template(String),

    /// Any other store or transport failure. Propagated for the caller to retry.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a not-found store outcome.
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for an already-exists store outcome.
    pub fn already_exists(kind: ResourceKind, name: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    /// Get the error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::AlreadyExists { .. } => "ALREADY_EXISTS",
            Error::Template(_) => "TEMPLATE_ERROR",
            Error::Store(_) => "STORE_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) | Error::Parse(_) | Error::Yaml(_) | Error::Json(_) => {
                ErrorCategory::ClientError
            }
            Error::NotFound { .. } | Error::AlreadyExists { .. } => ErrorCategory::Conflict,
            Error::Store(_) | Error::Io(_) => ErrorCategory::Transient,
            Error::Template(_) | Error::Config(_) | Error::Internal(_) => {
                ErrorCategory::Permanent
            }
        }
    }

    /// Convert to a JSON error envelope.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "category": self.category(),
                "message": self.to_string(),
            }
        })
    }
}

/// Error categories, used by callers to decide whether to re-invoke convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The desired spec is wrong. Do not retry until it changes.
    ClientError,
    /// Store or transport hiccup. Retry later.
    Transient,
    /// Broken assembly or configuration. Retrying will not help.
    Permanent,
    /// Expected store state outcome, handled inside convergence.
    Conflict,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::ClientError => write!(f, "client_error"),
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::Permanent => write!(f, "permanent"),
            ErrorCategory::Conflict => write!(f, "conflict"),
        }
    }
}
