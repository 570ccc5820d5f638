use chrono::NaiveDate;
use serde::Serialize;

use crate::{entity::*, status::*};

/// Progress milestone for each finding status. Progress is never stored
/// independently of status; transitions always write this value.
pub fn progress_for(status: FindingStatus) -> u8 {
    match status {
        FindingStatus::Registered => 0,
        FindingStatus::ActionPlanned => 25,
        FindingStatus::ActionExecuted => 50,
        FindingStatus::AnalysisCompleted => 75,
        FindingStatus::Closed => 100,
    }
}

/// The status a phase transition requires and the one it produces.
pub fn next_finding_status(current: FindingStatus) -> Option<FindingStatus> {
    match current {
        FindingStatus::Registered => Some(FindingStatus::ActionPlanned),
        FindingStatus::ActionPlanned => Some(FindingStatus::ActionExecuted),
        FindingStatus::ActionExecuted => Some(FindingStatus::AnalysisCompleted),
        FindingStatus::AnalysisCompleted => Some(FindingStatus::Closed),
        FindingStatus::Closed => None,
    }
}

/// Overdue is recomputed on read, never persisted.
pub fn action_is_overdue(action: &Action, today: NaiveDate) -> bool {
    action.planned_date < today && action.status != ActionStatus::Completed
}

pub fn clamp_percentage(pct: i64) -> u8 {
    pct.clamp(0, 100) as u8
}

/// Integer percentage with round-half-up; zero denominator yields zero.
pub fn rounded_percentage(numerator: u64, denominator: u64) -> u32 {
    if denominator == 0 {
        return 0;
    }
    ((numerator * 100 + denominator / 2) / denominator) as u32
}

/// Result of `validate_completion`: hard errors block `complete`, warnings
/// (missing meetings/report) do not.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct CompletionCheck {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CompletionCheck {
    pub fn is_blocking(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub fn validate_completion(audit: &Audit) -> CompletionCheck {
    let mut check = CompletionCheck::default();
    if audit.status != AuditStatus::InProgress {
        check
            .errors
            .push(format!("audit is {:?}, not in progress", audit.status));
    }
    let unverified = audit.unverified_count();
    if unverified > 0 {
        check
            .errors
            .push(format!("{unverified} norm points still unverified"));
    }
    if audit.opening_meeting.is_none() {
        check.warnings.push("opening meeting not recorded".into());
    }
    if audit.closing_meeting.is_none() {
        check.warnings.push("closing meeting not recorded".into());
    }
    if audit.report_delivery.is_none() {
        check.warnings.push("report delivery not recorded".into());
    }
    check
}

/// Per-audit conformity figures: weighted average over non-null entries and
/// the count of {NCM, NCm} codes.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct AuditConformity {
    pub points_total: usize,
    pub points_verified: usize,
    pub average_conformity: u32,
    pub non_conformities: usize,
}

pub fn audit_conformity(audit: &Audit) -> AuditConformity {
    let mut verified = 0u64;
    let mut weight_sum = 0u64;
    let mut non_conformities = 0usize;
    for v in &audit.verifications {
        if let Some(status) = v.conformity_status {
            verified += 1;
            weight_sum += u64::from(status.weight());
            if status.is_non_conformity() {
                non_conformities += 1;
            }
        }
    }
    AuditConformity {
        points_total: audit.verifications.len(),
        points_verified: verified as usize,
        average_conformity: if verified == 0 {
            0
        } else {
            ((weight_sum + verified / 2) / verified) as u32
        },
        non_conformities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::ids::*;

    fn audit_with(codes: &[(&str, Option<ConformityStatus>)]) -> Audit {
        Audit {
            id: AuditId::new(),
            audit_number: "AUD-2026-00001".into(),
            title: "t".into(),
            audit_type: AuditType::Partial,
            scope: "s".into(),
            planned_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            lead_auditor: UserId::from_str("u1"),
            selected_norm_points: codes.iter().map(|(c, _)| c.to_string()).collect(),
            status: AuditStatus::InProgress,
            verifications: codes
                .iter()
                .map(|(c, s)| NormPointVerification {
                    conformity_status: *s,
                    ..NormPointVerification::pending(*c)
                })
                .collect(),
            opening_meeting: None,
            closing_meeting: None,
            report_delivery: None,
            previous_actions_verification: None,
            observations: None,
            execution_started_at: Some(Utc::now()),
            completed_at: None,
            created_at: Utc::now(),
            created_by: UserId::from_str("u1"),
            updated_by: None,
            version: 1,
            deleted_at: None,
        }
    }

    #[test]
    fn progress_matches_status_milestones() {
        assert_eq!(progress_for(FindingStatus::Registered), 0);
        assert_eq!(progress_for(FindingStatus::ActionPlanned), 25);
        assert_eq!(progress_for(FindingStatus::ActionExecuted), 50);
        assert_eq!(progress_for(FindingStatus::AnalysisCompleted), 75);
        assert_eq!(progress_for(FindingStatus::Closed), 100);
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp_percentage(-10), 0);
        assert_eq!(clamp_percentage(150), 100);
        assert_eq!(clamp_percentage(42), 42);
    }

    #[test]
    fn percentage_guards_zero_denominator() {
        assert_eq!(rounded_percentage(0, 0), 0);
        assert_eq!(rounded_percentage(1, 3), 33);
        assert_eq!(rounded_percentage(2, 3), 67);
        assert_eq!(rounded_percentage(4, 4), 100);
    }

    #[test]
    fn conformity_average_and_nc_count() {
        let audit = audit_with(&[
            ("4.4", Some(ConformityStatus::Cf)),
            ("7.5", Some(ConformityStatus::NcMajor)),
        ]);
        let stats = audit_conformity(&audit);
        assert_eq!(stats.average_conformity, 50);
        assert_eq!(stats.non_conformities, 1);
        assert_eq!(stats.points_verified, 2);
    }

    #[test]
    fn conformity_ignores_unverified_entries() {
        let audit = audit_with(&[
            ("4.4", Some(ConformityStatus::Cf)),
            ("7.5", None),
        ]);
        let stats = audit_conformity(&audit);
        assert_eq!(stats.average_conformity, 100);
        assert_eq!(stats.points_verified, 1);
        assert_eq!(stats.points_total, 2);
    }

    #[test]
    fn completion_check_blocks_on_unverified_only() {
        let audit = audit_with(&[("4.4", Some(ConformityStatus::Cf)), ("7.5", None)]);
        let check = validate_completion(&audit);
        assert!(check.is_blocking());

        let done = audit_with(&[("4.4", Some(ConformityStatus::Cf))]);
        let check = validate_completion(&done);
        assert!(!check.is_blocking());
        // meetings and report are warnings, never errors
        assert_eq!(check.warnings.len(), 3);
    }

    #[test]
    fn overdue_requires_past_date_and_open_status() {
        let today = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        let mut action = Action {
            id: ActionId::new(),
            action_number: "ACC-2026-00001".into(),
            title: "t".into(),
            description: "d".into(),
            finding_id: FindingId::new(),
            responsible: UserId::from_str("u1"),
            planned_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            priority: Priority::Medium,
            status: ActionStatus::Planned,
            progress_percentage: 0,
            start_date: None,
            completion_date: None,
            is_effective: None,
            verification_date: None,
            verification_notes: None,
            follow_up_required: false,
            follow_up_description: None,
            evidence: None,
            comments: vec![],
            created_at: Utc::now(),
            created_by: UserId::from_str("u1"),
            updated_by: None,
            version: 1,
            deleted_at: None,
        };
        assert!(action_is_overdue(&action, today));
        action.status = ActionStatus::Completed;
        assert!(!action_is_overdue(&action, today));
        action.status = ActionStatus::Planned;
        action.planned_date = today;
        assert!(!action_is_overdue(&action, today));
    }
}
