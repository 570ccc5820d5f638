use qms_store::StoreError;

use crate::error::{WorkflowError, WorkflowResult};

pub const MAX_CAS_ATTEMPTS: u32 = 3;

/// Read-modify-write wrapper shared by all four workflows. The closure must
/// re-read the entity on every attempt; a version conflict from the store
/// triggers a retry, and after `MAX_CAS_ATTEMPTS` the conflict surfaces as
/// `WorkflowError::Conflict` for the caller to handle.
pub fn with_retry<T>(
    entity: &'static str,
    id: &str,
    mut attempt: impl FnMut() -> WorkflowResult<T>,
) -> WorkflowResult<T> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt() {
            Err(WorkflowError::Store(StoreError::VersionConflict { .. })) => {
                if attempts >= MAX_CAS_ATTEMPTS {
                    return Err(WorkflowError::Conflict {
                        entity,
                        id: id.to_string(),
                        attempts,
                    });
                }
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict() -> WorkflowError {
        WorkflowError::Store(StoreError::VersionConflict {
            collection: "audits",
            id: "a1".into(),
            expected: 1,
        })
    }

    #[test]
    fn succeeds_first_try() {
        let result = with_retry("audit", "a1", || Ok(7));
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn retries_version_conflicts_then_succeeds() {
        let mut tries = 0;
        let result = with_retry("audit", "a1", || {
            tries += 1;
            if tries < 3 {
                Err(conflict())
            } else {
                Ok(tries)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut tries = 0;
        let result: WorkflowResult<()> = with_retry("audit", "a1", || {
            tries += 1;
            Err(conflict())
        });
        assert!(matches!(
            result,
            Err(WorkflowError::Conflict { attempts: MAX_CAS_ATTEMPTS, .. })
        ));
        assert_eq!(tries, MAX_CAS_ATTEMPTS);
    }

    #[test]
    fn non_conflict_errors_pass_through() {
        let mut tries = 0;
        let result: WorkflowResult<()> = with_retry("audit", "a1", || {
            tries += 1;
            Err(WorkflowError::NotFound {
                entity: "audit",
                id: "a1".into(),
            })
        });
        assert!(matches!(result, Err(WorkflowError::NotFound { .. })));
        assert_eq!(tries, 1);
    }
}
