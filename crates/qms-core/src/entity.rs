use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{ids::*, status::*};

/// One addressable clause of the governing quality standard.
/// Read-mostly; referenced by `chapter.section` code from audits and relations.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NormPoint {
    pub id: NormPointId,
    pub chapter: String,
    pub section: String,
    pub requirement_text: String,
    pub category: String,
    pub is_mandatory: bool,
    pub related_processes: Vec<String>,
    pub related_documents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub version: u64,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl NormPoint {
    pub fn code(&self) -> String {
        format!("{}.{}", self.chapter, self.section)
    }
}

/// An assertion that a subject does or does not satisfy a norm point.
/// (norm_point_id, subject_type, subject_id) is unique; the ledger rejects
/// duplicates at record time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ComplianceRelation {
    pub id: RelationId,
    pub norm_point_id: NormPointId,
    pub subject_type: SubjectType,
    pub subject_id: String,
    pub compliance_status: ComplianceStatus,
    pub evidence: Vec<String>,
    pub notes: Option<String>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub version: u64,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Verification of a single selected norm point within one audit.
/// The set of codes across an audit's verifications equals its
/// `selected_norm_points` from plan time onward; entries are replaced in
/// place, never added or removed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NormPointVerification {
    pub norm_point_code: String,
    pub conformity_status: Option<ConformityStatus>,
    pub processes_checked: Vec<String>,
    pub observations: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<UserId>,
}

impl NormPointVerification {
    pub fn pending(code: impl Into<String>) -> Self {
        Self {
            norm_point_code: code.into(),
            conformity_status: None,
            processes_checked: vec![],
            observations: None,
            verified_at: None,
            verified_by: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MeetingRecord {
    pub held_at: DateTime<Utc>,
    pub attendees: Vec<String>,
    pub notes: Option<String>,
    pub recorded_by: UserId,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReportDelivery {
    pub delivered_at: DateTime<Utc>,
    pub delivered_to: Vec<String>,
    pub notes: Option<String>,
    pub recorded_by: UserId,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Audit {
    pub id: AuditId,
    pub audit_number: String,
    pub title: String,
    pub audit_type: AuditType,
    pub scope: String,
    pub planned_date: NaiveDate,
    pub lead_auditor: UserId,
    pub selected_norm_points: Vec<String>,
    pub status: AuditStatus,
    pub verifications: Vec<NormPointVerification>,
    pub opening_meeting: Option<MeetingRecord>,
    pub closing_meeting: Option<MeetingRecord>,
    pub report_delivery: Option<ReportDelivery>,
    pub previous_actions_verification: Option<String>,
    pub observations: Option<String>,
    pub execution_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub updated_by: Option<UserId>,
    pub version: u64,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Audit {
    pub fn verification(&self, code: &str) -> Option<&NormPointVerification> {
        self.verifications.iter().find(|v| v.norm_point_code == code)
    }

    pub fn unverified_count(&self) -> usize {
        self.verifications
            .iter()
            .filter(|v| v.conformity_status.is_none())
            .count()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FindingSource {
    pub source_type: SourceType,
    pub source_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Registration {
    pub origin: String,
    pub name: String,
    pub description: String,
    pub source: FindingSource,
    pub process_ref: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub registered_by: UserId,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImmediateActionPlan {
    pub responsible: UserId,
    pub planned_date: NaiveDate,
    pub comments: Option<String>,
    pub planned_at: DateTime<Utc>,
    pub planned_by: UserId,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImmediateActionExecution {
    pub executed_on: NaiveDate,
    pub correction: String,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: UserId,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RootCauseAnalysis {
    pub analysis: String,
    pub requires_action: bool,
    pub analyzed_at: DateTime<Utc>,
    pub analyzed_by: UserId,
}

/// A non-conformity moving through the fixed four-phase resolution
/// lifecycle. `progress` is a strict function of `status`; phases are filled
/// strictly in order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub id: FindingId,
    pub finding_number: String,
    pub registration: Registration,
    pub immediate_action_plan: Option<ImmediateActionPlan>,
    pub immediate_action_execution: Option<ImmediateActionExecution>,
    pub root_cause_analysis: Option<RootCauseAnalysis>,
    pub status: FindingStatus,
    pub progress: u8,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub version: u64,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Finding {
    pub fn current_phase(&self) -> &'static str {
        self.status.phase_label()
    }
}

/// A tracked remediation task linked to a finding. Completion and
/// effectiveness are independent axes: `is_effective` stays `None` until the
/// verification step runs, which may happen in any status.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub id: ActionId,
    pub action_number: String,
    pub title: String,
    pub description: String,
    pub finding_id: FindingId,
    pub responsible: UserId,
    pub planned_date: NaiveDate,
    pub priority: Priority,
    pub status: ActionStatus,
    pub progress_percentage: u8,
    pub start_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub is_effective: Option<bool>,
    pub verification_date: Option<NaiveDate>,
    pub verification_notes: Option<String>,
    pub follow_up_required: bool,
    pub follow_up_description: Option<String>,
    pub evidence: Option<String>,
    pub comments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub updated_by: Option<UserId>,
    pub version: u64,
    pub deleted_at: Option<DateTime<Utc>>,
}
