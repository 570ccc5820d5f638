use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Process,
    Document,
    Procedure,
    Policy,
}

impl SubjectType {
    pub const ALL: [SubjectType; 4] = [
        SubjectType::Process,
        SubjectType::Document,
        SubjectType::Procedure,
        SubjectType::Policy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Process => "process",
            SubjectType::Document => "document",
            SubjectType::Procedure => "procedure",
            SubjectType::Policy => "policy",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    Partial,
    NotApplicable,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditType {
    Complete,
    Partial,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Planned,
    InProgress,
    Completed,
}

/// Conformity classification of one norm point within one audit.
/// The codes are carried opaquely from the governing standard; only the
/// weight classes and the non-conformity subset {NCM, NCm} are semantic.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConformityStatus {
    #[serde(rename = "CF")]
    Cf,
    #[serde(rename = "NCM")]
    NcMajor,
    #[serde(rename = "NCm")]
    NcMinor,
    #[serde(rename = "NCT")]
    Nct,
    #[serde(rename = "R")]
    R,
    #[serde(rename = "OM")]
    Om,
    #[serde(rename = "F")]
    F,
}

impl ConformityStatus {
    pub fn is_non_conformity(&self) -> bool {
        matches!(self, ConformityStatus::NcMajor | ConformityStatus::NcMinor)
    }

    /// Weight used by the conformity average: CF counts full, the two
    /// non-conformity codes count zero, everything else counts half.
    pub fn weight(&self) -> u32 {
        match self {
            ConformityStatus::Cf => 100,
            ConformityStatus::NcMajor | ConformityStatus::NcMinor => 0,
            _ => 50,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Registered,
    ActionPlanned,
    ActionExecuted,
    AnalysisCompleted,
    Closed,
}

impl FindingStatus {
    /// Phase label mirrored from status (not stored separately).
    pub fn phase_label(&self) -> &'static str {
        match self {
            FindingStatus::Registered => "registration",
            FindingStatus::ActionPlanned => "immediate_action_planning",
            FindingStatus::ActionExecuted => "immediate_action_execution",
            FindingStatus::AnalysisCompleted => "root_cause_analysis",
            FindingStatus::Closed => "closure",
        }
    }
}

/// Canonical action status. The generic vocabulary used by other call sites
/// (`pending`/`in_progress`) maps onto this one at the serde boundary.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    #[serde(alias = "pending")]
    Planned,
    #[serde(alias = "in_progress")]
    InExecution,
    Completed,
    Cancelled,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Where a finding came from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Audit,
    Process,
    Complaint,
    Review,
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conformity_weights() {
        assert_eq!(ConformityStatus::Cf.weight(), 100);
        assert_eq!(ConformityStatus::NcMajor.weight(), 0);
        assert_eq!(ConformityStatus::NcMinor.weight(), 0);
        assert_eq!(ConformityStatus::Nct.weight(), 50);
        assert_eq!(ConformityStatus::Om.weight(), 50);
    }

    #[test]
    fn non_conformity_subset() {
        assert!(ConformityStatus::NcMajor.is_non_conformity());
        assert!(ConformityStatus::NcMinor.is_non_conformity());
        assert!(!ConformityStatus::Cf.is_non_conformity());
        assert!(!ConformityStatus::R.is_non_conformity());
    }

    #[test]
    fn action_status_accepts_generic_vocabulary() {
        let s: ActionStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(s, ActionStatus::Planned);
        let s: ActionStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(s, ActionStatus::InExecution);
        let s: ActionStatus = serde_json::from_str("\"in_execution\"").unwrap();
        assert_eq!(s, ActionStatus::InExecution);
    }

    #[test]
    fn conformity_codes_round_trip_as_standard_codes() {
        assert_eq!(serde_json::to_string(&ConformityStatus::NcMinor).unwrap(), "\"NCm\"");
        assert_eq!(serde_json::to_string(&ConformityStatus::NcMajor).unwrap(), "\"NCM\"");
        let c: ConformityStatus = serde_json::from_str("\"CF\"").unwrap();
        assert_eq!(c, ConformityStatus::Cf);
    }
}
