use std::sync::Arc;

use chrono::{Datelike, Utc};
use qms_core::{
    format_number, next_finding_status, progress_for, AnalyzeRootCause, Audit,
    ExecuteImmediateAction, Finding, FindingId, FindingSource, FindingStatus, ImmediateActionExecution,
    ImmediateActionPlan, NumberSeries, PlanImmediateAction, RegisterFinding, Registration,
    RootCauseAnalysis, SourceType, UserId,
};
use qms_store::{DocumentStore, Page};
use qms_validate::Validate;

use crate::error::{require, WorkflowError, WorkflowResult};
use crate::retry::with_retry;

/// Finding resolution state machine: four phases filled strictly in order,
/// each advancing status and progress by one fixed milestone. Re-invoking a
/// phase is rejected, not overwritten.
pub struct FindingWorkflow {
    store: Arc<dyn DocumentStore>,
}

impl FindingWorkflow {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn register(&self, input: RegisterFinding, actor: &UserId) -> WorkflowResult<Finding> {
        input.validate()?;
        let now = Utc::now();
        let year = now.year();
        let sequence = self
            .store
            .next_sequence(NumberSeries::Finding.collection(), year)?;
        let finding = Finding {
            id: FindingId::new(),
            finding_number: format_number(NumberSeries::Finding, year, sequence),
            registration: Registration {
                origin: input.origin,
                name: input.name,
                description: input.description,
                source: FindingSource {
                    source_type: input.source_type,
                    source_id: input.source_id,
                },
                process_ref: input.process_ref,
                registered_at: now,
                registered_by: actor.clone(),
            },
            immediate_action_plan: None,
            immediate_action_execution: None,
            root_cause_analysis: None,
            status: FindingStatus::Registered,
            progress: progress_for(FindingStatus::Registered),
            closed_at: None,
            closed_by: None,
            created_at: now,
            created_by: actor.clone(),
            version: 1,
            deleted_at: None,
        };
        self.store.insert_finding(finding.clone())?;
        Ok(finding)
    }

    /// Spawns a finding from a non-conforming norm point of an audit. The
    /// finding is written first and carries the back-reference; the audit
    /// itself is not modified, so a partial failure cannot dangle.
    pub fn register_from_audit(
        &self,
        audit: &Audit,
        norm_point_code: &str,
        actor: &UserId,
    ) -> WorkflowResult<Finding> {
        let verification = audit
            .verification(norm_point_code)
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "norm_point_verification",
                id: norm_point_code.to_string(),
            })?;
        let conformity = verification
            .conformity_status
            .ok_or_else(|| verification_state("register_from_audit", "unverified"))?;
        if !conformity.is_non_conformity() {
            return Err(verification_state("register_from_audit", "conforming"));
        }
        self.register(
            RegisterFinding {
                origin: audit.audit_number.clone(),
                name: format!("Non-conformity at norm point {norm_point_code}"),
                description: verification
                    .observations
                    .clone()
                    .unwrap_or_else(|| format!("{conformity:?} recorded during {}", audit.audit_number)),
                source_type: SourceType::Audit,
                source_id: Some(audit.id.to_string()),
                process_ref: verification.processes_checked.first().cloned(),
            },
            actor,
        )
    }

    pub fn get(&self, id: &FindingId) -> WorkflowResult<Finding> {
        require("finding", id.as_str(), self.store.get_finding(id)?)
    }

    pub fn list(&self, status: Option<FindingStatus>) -> WorkflowResult<Vec<Finding>> {
        let mut all = Vec::new();
        let mut page = Page::first();
        loop {
            let batch = self.store.list_findings(page)?;
            let done = batch.len() < page.limit;
            all.extend(
                batch
                    .into_iter()
                    .filter(|f| status.map_or(true, |s| f.status == s)),
            );
            if done {
                break;
            }
            page = page.next();
        }
        Ok(all)
    }

    pub fn plan_immediate_action(
        &self,
        id: &FindingId,
        input: PlanImmediateAction,
        actor: &UserId,
    ) -> WorkflowResult<Finding> {
        input.validate()?;
        self.advance(id, FindingStatus::Registered, "plan_immediate_action", |finding| {
            finding.immediate_action_plan = Some(ImmediateActionPlan {
                responsible: input.responsible.clone(),
                planned_date: input.planned_date,
                comments: input.comments.clone(),
                planned_at: Utc::now(),
                planned_by: actor.clone(),
            });
        })
    }

    pub fn execute_immediate_action(
        &self,
        id: &FindingId,
        input: ExecuteImmediateAction,
        actor: &UserId,
    ) -> WorkflowResult<Finding> {
        input.validate()?;
        self.advance(id, FindingStatus::ActionPlanned, "execute_immediate_action", |finding| {
            finding.immediate_action_execution = Some(ImmediateActionExecution {
                executed_on: input.executed_on,
                correction: input.correction.clone(),
                recorded_at: Utc::now(),
                recorded_by: actor.clone(),
            });
        })
    }

    /// `requires_action` is informational for reporting; creating an action
    /// from the finding is a separate, caller-initiated operation.
    pub fn analyze_root_cause(
        &self,
        id: &FindingId,
        input: AnalyzeRootCause,
        actor: &UserId,
    ) -> WorkflowResult<Finding> {
        input.validate()?;
        self.advance(id, FindingStatus::ActionExecuted, "analyze_root_cause", |finding| {
            finding.root_cause_analysis = Some(RootCauseAnalysis {
                analysis: input.analysis.clone(),
                requires_action: input.requires_action,
                analyzed_at: Utc::now(),
                analyzed_by: actor.clone(),
            });
        })
    }

    pub fn close(&self, id: &FindingId, actor: &UserId) -> WorkflowResult<Finding> {
        self.advance(id, FindingStatus::AnalysisCompleted, "close", |finding| {
            finding.closed_at = Some(Utc::now());
            finding.closed_by = Some(actor.clone());
        })
    }

    /// One transition step: requires the exact predecessor status, writes
    /// the phase sub-record, and moves status/progress to the next milestone.
    fn advance(
        &self,
        id: &FindingId,
        required: FindingStatus,
        operation: &'static str,
        apply: impl Fn(&mut Finding),
    ) -> WorkflowResult<Finding> {
        with_retry("finding", id.as_str(), || {
            let mut finding = self.get(id)?;
            if finding.status != required {
                return Err(WorkflowError::InvalidState {
                    entity: "finding",
                    operation,
                    status: format!("{:?}", finding.status).to_lowercase(),
                });
            }
            let next = next_finding_status(finding.status)
                .unwrap_or(finding.status);
            apply(&mut finding);
            finding.status = next;
            finding.progress = progress_for(next);
            self.store.update_finding(&finding)?;
            finding.version += 1;
            Ok(finding)
        })
    }

    pub fn delete(&self, id: &FindingId) -> WorkflowResult<()> {
        self.get(id)?;
        self.store.delete_finding(id, Utc::now())?;
        Ok(())
    }
}

fn verification_state(operation: &'static str, status: &str) -> WorkflowError {
    WorkflowError::InvalidState {
        entity: "norm_point_verification",
        operation,
        status: status.to_string(),
    }
}
