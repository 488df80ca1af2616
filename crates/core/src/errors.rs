use thiserror::Error;

use crate::hierarchy::{MoveError, MoveViolation};
use crate::nps::AlertTransitionError;
use crate::workflow::WorkflowError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid move: {}", describe_moves(.violations))]
    InvalidMove { violations: Vec<MoveViolation> },
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    AlertTransition(#[from] AlertTransitionError),
    #[error("score {0} is outside the 0..=10 scale")]
    InvalidScore(u8),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    /// One human-readable line per violated rule.
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::InvalidMove { violations } => {
                violations.iter().map(MoveViolation::reason).collect()
            }
            Self::Workflow(error) => {
                error.violations().iter().map(ToString::to_string).collect()
            }
            other => vec![other.to_string()],
        }
    }
}

fn describe_moves(violations: &[MoveViolation]) -> String {
    violations.iter().map(MoveViolation::reason).collect::<Vec<_>>().join("; ")
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<MoveError> for ApplicationError {
    fn from(value: MoveError) -> Self {
        Self::NotFound(value.to_string())
    }
}

impl From<WorkflowError> for ApplicationError {
    fn from(value: WorkflowError) -> Self {
        Self::Domain(DomainError::Workflow(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, details: Vec<String>, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => {
                "The record changed while you were working on it. Reload and retry."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::ServiceUnavailable { .. })
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                details: error.details(),
                correlation_id,
            },
            ApplicationError::Conflict(message) => Self::Conflict { message, correlation_id },
            ApplicationError::NotFound(message) => Self::NotFound { message, correlation_id },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
