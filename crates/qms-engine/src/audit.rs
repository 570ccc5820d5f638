use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use qms_core::{
    format_number, validate_completion, Audit, AuditId, AuditStatus, AuditType, CompletionCheck,
    EditAudit, MeetingInput, MeetingRecord, NormPointVerification, NumberSeries, PlanAudit,
    RecordVerification, ReportDelivery, ReportDeliveryInput, UserId,
};
use qms_store::{DocumentStore, Page};
use qms_validate::{FieldErrors, Validate};

use crate::error::{require, WorkflowError, WorkflowResult};
use crate::registry::NormPointRegistry;
use crate::retry::with_retry;

/// Audit execution state machine: planned -> in_progress -> completed,
/// strictly forward. The verification array is fixed at plan time; execution
/// only fills entries in.
pub struct AuditWorkflow {
    store: Arc<dyn DocumentStore>,
    registry: NormPointRegistry,
}

impl AuditWorkflow {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let registry = NormPointRegistry::new(store.clone());
        Self { store, registry }
    }

    pub fn plan(&self, input: PlanAudit, actor: &UserId) -> WorkflowResult<Audit> {
        input.validate()?;
        let selection = self.resolve_selection(input.audit_type, &input.norm_point_selection)?;

        let year = input.planned_date.year();
        let sequence = self.store.next_sequence(NumberSeries::Audit.collection(), year)?;
        let audit = Audit {
            id: AuditId::new(),
            audit_number: format_number(NumberSeries::Audit, year, sequence),
            title: input.title,
            audit_type: input.audit_type,
            scope: input.scope,
            planned_date: input.planned_date,
            lead_auditor: input.lead_auditor,
            // the verification array always derives from the resolved
            // selection, never from caller input
            verifications: selection
                .iter()
                .map(|code| NormPointVerification::pending(code.clone()))
                .collect(),
            selected_norm_points: selection,
            status: AuditStatus::Planned,
            opening_meeting: None,
            closing_meeting: None,
            report_delivery: None,
            previous_actions_verification: None,
            observations: None,
            execution_started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            created_by: actor.clone(),
            updated_by: None,
            version: 1,
            deleted_at: None,
        };
        self.store.insert_audit(audit.clone())?;
        Ok(audit)
    }

    fn resolve_selection(
        &self,
        audit_type: AuditType,
        requested: &[String],
    ) -> WorkflowResult<Vec<String>> {
        match audit_type {
            AuditType::Complete => {
                let codes = self.registry.mandatory_codes()?;
                if codes.is_empty() {
                    let mut errors = FieldErrors::new();
                    errors.push("audit_type", "no mandatory norm points are registered");
                    return Err(errors.into());
                }
                Ok(codes)
            }
            AuditType::Partial => {
                let mut errors = FieldErrors::new();
                let mut codes = Vec::new();
                for code in requested {
                    let code = code.trim();
                    if self.store.get_norm_point_by_code(code)?.is_none() {
                        errors.push("norm_point_selection", format!("unknown norm point {code}"));
                    } else if !codes.iter().any(|c| c == code) {
                        codes.push(code.to_string());
                    }
                }
                errors.into_result()?;
                Ok(codes)
            }
        }
    }

    pub fn get(&self, id: &AuditId) -> WorkflowResult<Audit> {
        require("audit", id.as_str(), self.store.get_audit(id)?)
    }

    pub fn list(&self) -> WorkflowResult<Vec<Audit>> {
        let mut all = Vec::new();
        let mut page = Page::first();
        loop {
            let batch = self.store.list_audits(page)?;
            let done = batch.len() < page.limit;
            all.extend(batch);
            if done {
                break;
            }
            page = page.next();
        }
        Ok(all)
    }

    /// Fixes the verification array and moves planned -> in_progress.
    pub fn start_execution(
        &self,
        id: &AuditId,
        execution_date: DateTime<Utc>,
        actor: &UserId,
    ) -> WorkflowResult<Audit> {
        with_retry("audit", id.as_str(), || {
            let mut audit = self.get(id)?;
            if audit.status != AuditStatus::Planned {
                return Err(invalid_state("start_execution", &audit));
            }
            audit.status = AuditStatus::InProgress;
            audit.execution_started_at = Some(execution_date);
            audit.updated_by = Some(actor.clone());
            self.store.update_audit(&audit)?;
            audit.version += 1;
            Ok(audit)
        })
    }

    /// Replaces the matching verification entry in place (looked up by code,
    /// never by position) and stamps verifier identity and time.
    pub fn record_verification(
        &self,
        id: &AuditId,
        input: RecordVerification,
        actor: &UserId,
    ) -> WorkflowResult<Audit> {
        input.validate()?;
        with_retry("audit", id.as_str(), || {
            let mut audit = self.get(id)?;
            if audit.status != AuditStatus::InProgress {
                return Err(invalid_state("record_verification", &audit));
            }
            let code = input.norm_point_code.trim();
            let entry = audit
                .verifications
                .iter_mut()
                .find(|v| v.norm_point_code == code)
                .ok_or_else(|| WorkflowError::NotFound {
                    entity: "norm_point_verification",
                    id: code.to_string(),
                })?;
            entry.conformity_status = Some(input.conformity_status);
            entry.processes_checked = input.processes_checked.clone();
            entry.observations = input.observations.clone();
            entry.verified_at = Some(Utc::now());
            entry.verified_by = Some(actor.clone());
            audit.updated_by = Some(actor.clone());
            self.store.update_audit(&audit)?;
            audit.version += 1;
            Ok(audit)
        })
    }

    pub fn record_opening_meeting(
        &self,
        id: &AuditId,
        input: MeetingInput,
        actor: &UserId,
    ) -> WorkflowResult<Audit> {
        input.validate()?;
        self.record_side_record("record_opening_meeting", id, actor, |audit, actor| {
            audit.opening_meeting = Some(meeting(&input, actor));
        })
    }

    pub fn record_closing_meeting(
        &self,
        id: &AuditId,
        input: MeetingInput,
        actor: &UserId,
    ) -> WorkflowResult<Audit> {
        input.validate()?;
        self.record_side_record("record_closing_meeting", id, actor, |audit, actor| {
            audit.closing_meeting = Some(meeting(&input, actor));
        })
    }

    pub fn record_report_delivery(
        &self,
        id: &AuditId,
        input: ReportDeliveryInput,
        actor: &UserId,
    ) -> WorkflowResult<Audit> {
        input.validate()?;
        self.record_side_record("record_report_delivery", id, actor, |audit, actor| {
            audit.report_delivery = Some(ReportDelivery {
                delivered_at: input.delivered_at,
                delivered_to: input.delivered_to.clone(),
                notes: input.notes.clone(),
                recorded_by: actor.clone(),
            });
        })
    }

    pub fn record_observations(
        &self,
        id: &AuditId,
        text: String,
        actor: &UserId,
    ) -> WorkflowResult<Audit> {
        self.record_side_record("record_observations", id, actor, |audit, _| {
            audit.observations = Some(text.clone());
        })
    }

    pub fn record_previous_actions_verification(
        &self,
        id: &AuditId,
        text: String,
        actor: &UserId,
    ) -> WorkflowResult<Audit> {
        self.record_side_record("record_previous_actions_verification", id, actor, |audit, _| {
            audit.previous_actions_verification = Some(text.clone());
        })
    }

    /// Meetings, report delivery and previous-action notes are execution
    /// records: they may be captured any time after planning ends, including
    /// on a completed audit (late report delivery).
    fn record_side_record(
        &self,
        operation: &'static str,
        id: &AuditId,
        actor: &UserId,
        apply: impl Fn(&mut Audit, &UserId),
    ) -> WorkflowResult<Audit> {
        with_retry("audit", id.as_str(), || {
            let mut audit = self.get(id)?;
            if audit.status == AuditStatus::Planned {
                return Err(invalid_state(operation, &audit));
            }
            apply(&mut audit, actor);
            audit.updated_by = Some(actor.clone());
            self.store.update_audit(&audit)?;
            audit.version += 1;
            Ok(audit)
        })
    }

    /// Hard errors only (unverified points); missing meetings or report are
    /// surfaced as warnings through `completion_check` and never block.
    pub fn complete(&self, id: &AuditId, actor: &UserId) -> WorkflowResult<Audit> {
        with_retry("audit", id.as_str(), || {
            let mut audit = self.get(id)?;
            if audit.status != AuditStatus::InProgress {
                return Err(invalid_state("complete", &audit));
            }
            let unverified = audit.unverified_count();
            if unverified > 0 {
                return Err(WorkflowError::IncompleteVerification {
                    id: id.to_string(),
                    unverified,
                });
            }
            audit.status = AuditStatus::Completed;
            audit.completed_at = Some(Utc::now());
            audit.updated_by = Some(actor.clone());
            self.store.update_audit(&audit)?;
            audit.version += 1;
            Ok(audit)
        })
    }

    pub fn completion_check(&self, id: &AuditId) -> WorkflowResult<CompletionCheck> {
        Ok(validate_completion(&self.get(id)?))
    }

    /// Plan-time fields are frozen once execution starts; only `edit` while
    /// planned may change them. A selection change rebuilds the verification
    /// array from the re-resolved selection.
    pub fn edit(&self, id: &AuditId, input: EditAudit, actor: &UserId) -> WorkflowResult<Audit> {
        input.validate()?;
        with_retry("audit", id.as_str(), || {
            let mut audit = self.get(id)?;
            if audit.status != AuditStatus::Planned {
                return Err(invalid_state("edit", &audit));
            }
            if let Some(title) = &input.title {
                audit.title = title.clone();
            }
            if let Some(scope) = &input.scope {
                audit.scope = scope.clone();
            }
            if let Some(date) = input.planned_date {
                audit.planned_date = date;
            }
            if let Some(lead) = &input.lead_auditor {
                audit.lead_auditor = lead.clone();
            }
            if let Some(observations) = &input.observations {
                audit.observations = Some(observations.clone());
            }
            if let Some(selection) = &input.norm_point_selection {
                if audit.audit_type == AuditType::Complete {
                    let mut errors = FieldErrors::new();
                    errors.push(
                        "norm_point_selection",
                        "a complete audit derives its selection from the mandatory set",
                    );
                    return Err(errors.into());
                }
                let resolved = self.resolve_selection(AuditType::Partial, selection)?;
                audit.verifications = resolved
                    .iter()
                    .map(|code| NormPointVerification::pending(code.clone()))
                    .collect();
                audit.selected_norm_points = resolved;
            }
            audit.updated_by = Some(actor.clone());
            self.store.update_audit(&audit)?;
            audit.version += 1;
            Ok(audit)
        })
    }

    pub fn delete(&self, id: &AuditId) -> WorkflowResult<()> {
        // tombstone; reads and aggregations ignore the record from here on
        self.get(id)?;
        self.store.delete_audit(id, Utc::now())?;
        Ok(())
    }
}

fn invalid_state(operation: &'static str, audit: &Audit) -> WorkflowError {
    WorkflowError::InvalidState {
        entity: "audit",
        operation,
        status: format!("{:?}", audit.status).to_lowercase(),
    }
}

fn meeting(input: &MeetingInput, actor: &UserId) -> MeetingRecord {
    MeetingRecord {
        held_at: input.held_at,
        attendees: input.attendees.clone(),
        notes: input.notes.clone(),
        recorded_by: actor.clone(),
    }
}
