use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{ids::*, status::*};

/// Inputs to the mutating workflow operations. Plain data; field-level
/// validation lives in qms-validate.

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanAudit {
    pub title: String,
    pub audit_type: AuditType,
    pub scope: String,
    pub planned_date: NaiveDate,
    pub lead_auditor: UserId,
    /// Explicit subset for partial audits. Must be empty for complete audits,
    /// whose selection is resolved from the registry's mandatory set.
    pub norm_point_selection: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EditAudit {
    pub title: Option<String>,
    pub scope: Option<String>,
    pub planned_date: Option<NaiveDate>,
    pub lead_auditor: Option<UserId>,
    pub norm_point_selection: Option<Vec<String>>,
    pub observations: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordVerification {
    pub norm_point_code: String,
    pub conformity_status: ConformityStatus,
    pub processes_checked: Vec<String>,
    pub observations: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeetingInput {
    pub held_at: DateTime<Utc>,
    pub attendees: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportDeliveryInput {
    pub delivered_at: DateTime<Utc>,
    pub delivered_to: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterFinding {
    pub origin: String,
    pub name: String,
    pub description: String,
    pub source_type: SourceType,
    pub source_id: Option<String>,
    pub process_ref: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanImmediateAction {
    pub responsible: UserId,
    pub planned_date: NaiveDate,
    pub comments: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecuteImmediateAction {
    pub executed_on: NaiveDate,
    pub correction: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyzeRootCause {
    pub analysis: String,
    pub requires_action: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAction {
    pub finding_id: FindingId,
    pub title: String,
    pub description: String,
    pub responsible: UserId,
    pub planned_date: NaiveDate,
    pub priority: Priority,
    pub comments: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyEffectiveness {
    pub is_effective: bool,
    pub verification_date: NaiveDate,
    pub notes: Option<String>,
    pub follow_up_required: bool,
    pub follow_up_description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterNormPoint {
    pub chapter: String,
    pub section: String,
    pub requirement_text: String,
    pub category: String,
    pub is_mandatory: bool,
    pub related_processes: Vec<String>,
    pub related_documents: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordRelation {
    pub norm_point_code: String,
    pub subject_type: SubjectType,
    pub subject_id: String,
    pub compliance_status: ComplianceStatus,
    pub evidence: Vec<String>,
    pub notes: Option<String>,
}
