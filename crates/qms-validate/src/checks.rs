use qms_core::{
    AnalyzeRootCause, AuditType, CreateAction, EditAudit, ExecuteImmediateAction, MeetingInput,
    PlanAudit, PlanImmediateAction, RecordRelation, RecordVerification, RegisterFinding,
    RegisterNormPoint, ReportDeliveryInput, VerifyEffectiveness,
};

use crate::types::FieldErrors;

pub trait Validate {
    fn validate(&self) -> Result<(), FieldErrors>;
}

fn require(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(field, "must not be empty");
    }
}

impl Validate for PlanAudit {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "title", &self.title);
        require(&mut errors, "scope", &self.scope);
        require(&mut errors, "lead_auditor", self.lead_auditor.as_str());
        match self.audit_type {
            AuditType::Partial => {
                if self.norm_point_selection.is_empty() {
                    errors.push("norm_point_selection", "a partial audit needs at least one norm point");
                }
            }
            AuditType::Complete => {
                if !self.norm_point_selection.is_empty() {
                    errors.push(
                        "norm_point_selection",
                        "a complete audit derives its selection from the mandatory set",
                    );
                }
            }
        }
        for code in &self.norm_point_selection {
            if code.trim().is_empty() {
                errors.push("norm_point_selection", "norm point codes must not be empty");
            }
        }
        errors.into_result()
    }
}

impl Validate for EditAudit {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if let Some(title) = &self.title {
            require(&mut errors, "title", title);
        }
        if let Some(scope) = &self.scope {
            require(&mut errors, "scope", scope);
        }
        if let Some(selection) = &self.norm_point_selection {
            if selection.is_empty() {
                errors.push("norm_point_selection", "selection must not be emptied");
            }
        }
        errors.into_result()
    }
}

impl Validate for RecordVerification {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "norm_point_code", &self.norm_point_code);
        errors.into_result()
    }
}

impl Validate for MeetingInput {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.attendees.is_empty() {
            errors.push("attendees", "a meeting needs at least one attendee");
        }
        errors.into_result()
    }
}

impl Validate for ReportDeliveryInput {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.delivered_to.is_empty() {
            errors.push("delivered_to", "report must be delivered to someone");
        }
        errors.into_result()
    }
}

impl Validate for RegisterFinding {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "origin", &self.origin);
        require(&mut errors, "name", &self.name);
        require(&mut errors, "description", &self.description);
        errors.into_result()
    }
}

impl Validate for PlanImmediateAction {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "responsible", self.responsible.as_str());
        errors.into_result()
    }
}

impl Validate for ExecuteImmediateAction {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "correction", &self.correction);
        errors.into_result()
    }
}

impl Validate for AnalyzeRootCause {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "analysis", &self.analysis);
        errors.into_result()
    }
}

impl Validate for CreateAction {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "title", &self.title);
        require(&mut errors, "description", &self.description);
        require(&mut errors, "responsible", self.responsible.as_str());
        errors.into_result()
    }
}

impl Validate for VerifyEffectiveness {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.follow_up_required
            && self
                .follow_up_description
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            errors.push("follow_up_description", "required when follow-up is requested");
        }
        errors.into_result()
    }
}

impl Validate for RegisterNormPoint {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "chapter", &self.chapter);
        require(&mut errors, "section", &self.section);
        require(&mut errors, "requirement_text", &self.requirement_text);
        require(&mut errors, "category", &self.category);
        errors.into_result()
    }
}

impl Validate for RecordRelation {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "norm_point_code", &self.norm_point_code);
        require(&mut errors, "subject_id", &self.subject_id);
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use qms_core::{ComplianceStatus, SubjectType, UserId};

    fn plan(audit_type: AuditType, selection: Vec<String>) -> PlanAudit {
        PlanAudit {
            title: "Annual internal audit".into(),
            audit_type,
            scope: "whole organization".into(),
            planned_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            lead_auditor: UserId::from_str("auditor-1"),
            norm_point_selection: selection,
        }
    }

    #[test]
    fn partial_audit_requires_selection() {
        let err = plan(AuditType::Partial, vec![]).validate().unwrap_err();
        assert!(err.fields().any(|(f, _)| f == "norm_point_selection"));
    }

    #[test]
    fn complete_audit_rejects_caller_selection() {
        let err = plan(AuditType::Complete, vec!["4.4".into()])
            .validate()
            .unwrap_err();
        assert!(err.fields().any(|(f, _)| f == "norm_point_selection"));
        assert!(plan(AuditType::Complete, vec![]).validate().is_ok());
    }

    #[test]
    fn blank_title_reported_per_field() {
        let mut input = plan(AuditType::Partial, vec!["4.4".into()]);
        input.title = "   ".into();
        let err = input.validate().unwrap_err();
        assert!(err.fields().any(|(f, _)| f == "title"));
    }

    #[test]
    fn follow_up_needs_description() {
        let input = VerifyEffectiveness {
            is_effective: false,
            verification_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            notes: None,
            follow_up_required: true,
            follow_up_description: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn relation_input_requires_subject() {
        let input = RecordRelation {
            norm_point_code: "4.4".into(),
            subject_type: SubjectType::Process,
            subject_id: "".into(),
            compliance_status: ComplianceStatus::Compliant,
            evidence: vec![],
            notes: None,
        };
        assert!(input.validate().is_err());
    }
}
