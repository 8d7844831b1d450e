use crate::requirements::UnmetRequirement;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed workflow definition or request input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Edit attempted against a published workflow definition
    #[error("Workflow definition {0} is published and cannot be modified")]
    ImmutableDefinition(String),

    /// Transition does not exist or does not leave the current state
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Incident sits in a terminal state
    #[error("Incident {incident_id} is in terminal state '{state}'")]
    TerminalState { incident_id: String, state: String },

    /// Actor lacks the permission required by the transition
    #[error("Permission denied: actor '{actor}' lacks permission '{permission}'")]
    PermissionDenied { actor: String, permission: String },

    /// One or more transition requirements are unsatisfied
    #[error("Requirements not met: {}", format_unmet(.unmet))]
    RequirementsNotMet { unmet: Vec<UnmetRequirement> },

    /// Transition action failed
    #[error("Action error: {0}")]
    Action(String),

    /// Concurrent transition won the race for this incident
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Atomic commit did not complete within its time bound
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_unmet(unmet: &[UnmetRequirement]) -> String {
    unmet
        .iter()
        .map(|u| u.reason.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::ImmutableDefinition(_) => "IMMUTABLE_DEFINITION",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::TerminalState { .. } => "TERMINAL_STATE",
            AppError::PermissionDenied { .. } => "PERMISSION_DENIED",
            AppError::RequirementsNotMet { .. } => "REQUIREMENTS_NOT_MET",
            AppError::Action(_) => "ACTION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a caller may retry after reloading the incident.
    ///
    /// The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_) | AppError::Timeout(_))
    }

    /// Unmet requirements carried by a `RequirementsNotMet` error
    pub fn unmet_requirements(&self) -> &[UnmetRequirement] {
        match self {
            AppError::RequirementsNotMet { unmet } => unmet,
            _ => &[],
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from serde_yaml::Error
impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from sled::Error
impl From<sled::Error> for AppError {
    fn from(err: sled::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
