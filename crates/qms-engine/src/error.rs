use qms_store::StoreError;
use qms_validate::FieldErrors;

/// Engine error taxonomy. Every variant carries a stable machine code
/// (`code()`) next to the human-readable message, so callers can render a
/// field error, a step error, or a retry prompt.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(#[from] FieldErrors),

    #[error("{operation} not allowed while {entity} is {status}")]
    InvalidState {
        entity: &'static str,
        operation: &'static str,
        status: String,
    },

    #[error("audit {id} has {unverified} unverified norm points")]
    IncompleteVerification { id: String, unverified: usize },

    /// Raised by the authorization collaborator before the engine runs;
    /// kept in the taxonomy so callers can tell it apart from engine errors.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("concurrent update on {entity} {id} persisted by another caller ({attempts} attempts)")]
    Conflict {
        entity: &'static str,
        id: String,
        attempts: u32,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::Validation(_) => "validation_failed",
            WorkflowError::InvalidState { .. } => "invalid_state",
            WorkflowError::IncompleteVerification { .. } => "incomplete_verification",
            WorkflowError::Forbidden(_) => "forbidden",
            WorkflowError::Conflict { .. } => "conflict",
            WorkflowError::Store(_) => "storage",
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Maps a soft-delete-aware `get` to the engine's NotFound.
pub fn require<T>(entity: &'static str, id: &str, found: Option<T>) -> WorkflowResult<T> {
    found.ok_or_else(|| WorkflowError::NotFound {
        entity,
        id: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = WorkflowError::NotFound {
            entity: "audit",
            id: "a1".into(),
        };
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.to_string(), "audit a1 not found");

        let err = WorkflowError::IncompleteVerification {
            id: "a1".into(),
            unverified: 3,
        };
        assert_eq!(err.code(), "incomplete_verification");
    }

    #[test]
    fn require_maps_none() {
        let missing: Option<()> = None;
        let err = require("finding", "f1", missing).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
        assert!(require("finding", "f1", Some(())).is_ok());
    }
}
